//! Configuration loading from TOML files
//!
//! Config file is selected via `--config <path>` (default: config/dev.toml).
//! A missing file falls back to defaults; a file that fails to parse or
//! validate is an error. Invalid values are never clamped.
//!
//! `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID` override the `[telegram]`
//! section when set.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::services::alert_policy::AlertPolicyConfig;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_capacity must be greater than zero")]
    ZeroCapacity,
    #[error("{field} must be a finite, non-negative, representable number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },
    #[error("mass event window must be greater than zero")]
    ZeroWindow,
    #[error("mass event threshold must be at least 1")]
    ZeroBurstThreshold,
    #[error("ratios must satisfy 0 < clear_ratio < set_ratio <= 1.0, got set={set} clear={clear}")]
    InvalidRatios { set: f64, clear: f64 },
    #[error("near_capacity_ratio must be in (0, 1], got {0}")]
    InvalidNearCapacityRatio(f64),
    #[error("trigger range must satisfy 0 <= min_distance_cm < trigger_distance_cm, got min={min} max={max}")]
    InvalidTriggerRange { min: f64, max: f64 },
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Runtime-adjustable counter options (the `configure()` surface)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CounterSettings {
    pub max_capacity: u32,
    pub cooldown_secs: f64,
    pub mass_event_threshold: usize,
    pub mass_event_window_secs: f64,
    pub capacity_set_ratio: f64,
    pub capacity_clear_ratio: f64,
    pub notification_cooldown_secs: f64,
}

impl Default for CounterSettings {
    fn default() -> Self {
        Self {
            max_capacity: 50,
            cooldown_secs: 2.0,
            mass_event_threshold: 3,
            mass_event_window_secs: 3.0,
            capacity_set_ratio: 1.0,
            capacity_clear_ratio: 0.9,
            notification_cooldown_secs: 300.0,
        }
    }
}

/// Partial change to [`CounterSettings`]; absent fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsUpdate {
    pub max_capacity: Option<u32>,
    pub cooldown_secs: Option<f64>,
    pub mass_event_threshold: Option<usize>,
    pub mass_event_window_secs: Option<f64>,
    pub capacity_set_ratio: Option<f64>,
    pub capacity_clear_ratio: Option<f64>,
    pub notification_cooldown_secs: Option<f64>,
}

impl SettingsUpdate {
    /// Overlay onto `base`. The result still needs `validate()`.
    pub fn apply_to(&self, base: CounterSettings) -> CounterSettings {
        CounterSettings {
            max_capacity: self.max_capacity.unwrap_or(base.max_capacity),
            cooldown_secs: self.cooldown_secs.unwrap_or(base.cooldown_secs),
            mass_event_threshold: self.mass_event_threshold.unwrap_or(base.mass_event_threshold),
            mass_event_window_secs: self.mass_event_window_secs.unwrap_or(base.mass_event_window_secs),
            capacity_set_ratio: self.capacity_set_ratio.unwrap_or(base.capacity_set_ratio),
            capacity_clear_ratio: self.capacity_clear_ratio.unwrap_or(base.capacity_clear_ratio),
            notification_cooldown_secs: self
                .notification_cooldown_secs
                .unwrap_or(base.notification_cooldown_secs),
        }
    }
}

/// Accepts exactly the values `Duration::from_secs_f64` can take without panicking
fn check_secs(field: &'static str, value: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(_) => Ok(()),
        Err(_) => Err(ConfigError::InvalidDuration { field, value }),
    }
}

impl CounterSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        check_secs("cooldown", self.cooldown_secs)?;
        check_secs("mass_event_window", self.mass_event_window_secs)?;
        if self.mass_event_window_secs == 0.0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.mass_event_threshold == 0 {
            return Err(ConfigError::ZeroBurstThreshold);
        }
        let (set, clear) = (self.capacity_set_ratio, self.capacity_clear_ratio);
        // Negated comparisons so NaN is rejected too
        if !(clear > 0.0 && clear < set && set <= 1.0) {
            return Err(ConfigError::InvalidRatios { set, clear });
        }
        check_secs("notification_cooldown", self.notification_cooldown_secs)?;
        Ok(())
    }

    /// Per-sensor debounce cooldown. Call after `validate()`.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs)
    }

    pub fn mass_event_window(&self) -> Duration {
        Duration::from_secs_f64(self.mass_event_window_secs)
    }

    pub fn notification_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.notification_cooldown_secs)
    }

    pub fn alert_policy_config(&self) -> AlertPolicyConfig {
        AlertPolicyConfig {
            set_ratio: self.capacity_set_ratio,
            clear_ratio: self.capacity_clear_ratio,
            notification_cooldown: self.notification_cooldown(),
            burst_window: self.mass_event_window(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Serial,
    Stdin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "room".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    /// Triggers closer than this count as a person in the beam
    pub trigger_distance_cm: f64,
    /// Readings at or below this are treated as sensor noise
    pub min_distance_cm: f64,
    pub cooldown_secs: f64,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self { trigger_distance_cm: 100.0, min_distance_cm: 2.0, cooldown_secs: 2.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OccupancyConfig {
    pub max_capacity: u32,
    pub near_capacity_ratio: f64,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self { max_capacity: 50, near_capacity_ratio: 0.8 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MassEventConfig {
    pub threshold: usize,
    pub window_secs: f64,
}

impl Default for MassEventConfig {
    fn default() -> Self {
        Self { threshold: 3, window_secs: 3.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub set_ratio: f64,
    pub clear_ratio: f64,
    pub notification_cooldown_secs: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { set_ratio: 1.0, clear_ratio: 0.9, notification_cooldown_secs: 300.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub device: String,
    pub baud: u32,
    /// Delay before reopening the serial port after an error
    pub reconnect_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Serial,
            device: "/dev/ttyUSB0".to_string(),
            baud: 115_200,
            reconnect_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub queue_size: usize,
    /// Per-attempt timeout
    pub timeout_ms: u64,
    pub max_attempts: u32,
    /// Base delay; doubles after every failed attempt
    pub backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { queue_size: 64, timeout_ms: 5000, max_attempts: 3, backoff_ms: 500 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 1883,
            topic: "occupancy/alerts".to_string(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub interval_secs: u64,
    /// Interval of the occupancy statistics log line
    pub stats_interval_secs: u64,
    /// HTTP port for /metrics and /snapshot (0 to disable)
    pub http_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 10, stats_interval_secs: 15, http_port: 9090 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub occupancy: OccupancyConfig,
    #[serde(default)]
    pub mass_event: MassEventConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    trigger_distance_cm: f64,
    min_distance_cm: f64,
    near_capacity_ratio: f64,
    counter: CounterSettings,
    source_kind: SourceKind,
    source_device: String,
    source_baud: u32,
    source_reconnect_delay_ms: u64,
    dispatch_queue_size: usize,
    dispatch_timeout_ms: u64,
    dispatch_max_attempts: u32,
    dispatch_backoff_ms: u64,
    telegram_enabled: bool,
    telegram_bot_token: Option<String>,
    telegram_chat_id: Option<String>,
    webhook_enabled: bool,
    webhook_url: String,
    mqtt_enabled: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    metrics_interval_secs: u64,
    stats_interval_secs: u64,
    http_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let TomlConfig {
            site,
            sensors,
            occupancy,
            mass_event,
            alerts,
            source,
            dispatch,
            telegram,
            webhook,
            mqtt,
            metrics,
        } = toml_config;

        Self {
            site_id: site.id,
            trigger_distance_cm: sensors.trigger_distance_cm,
            min_distance_cm: sensors.min_distance_cm,
            near_capacity_ratio: occupancy.near_capacity_ratio,
            counter: CounterSettings {
                max_capacity: occupancy.max_capacity,
                cooldown_secs: sensors.cooldown_secs,
                mass_event_threshold: mass_event.threshold,
                mass_event_window_secs: mass_event.window_secs,
                capacity_set_ratio: alerts.set_ratio,
                capacity_clear_ratio: alerts.clear_ratio,
                notification_cooldown_secs: alerts.notification_cooldown_secs,
            },
            source_kind: source.kind,
            source_device: source.device,
            source_baud: source.baud,
            source_reconnect_delay_ms: source.reconnect_delay_ms,
            dispatch_queue_size: dispatch.queue_size,
            dispatch_timeout_ms: dispatch.timeout_ms,
            dispatch_max_attempts: dispatch.max_attempts,
            dispatch_backoff_ms: dispatch.backoff_ms,
            telegram_enabled: telegram.enabled,
            telegram_bot_token: telegram.bot_token,
            telegram_chat_id: telegram.chat_id,
            webhook_enabled: webhook.enabled,
            webhook_url: webhook.url,
            mqtt_enabled: mqtt.enabled,
            mqtt_host: mqtt.host,
            mqtt_port: mqtt.port,
            mqtt_topic: mqtt.topic,
            mqtt_username: mqtt.username,
            mqtt_password: mqtt.password,
            metrics_interval_secs: metrics.interval_secs,
            stats_interval_secs: metrics.stats_interval_secs,
            http_port: metrics.http_port,
            config_file: config_file.to_string(),
        }
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str, config_file: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {config_file}"))?;

        let config = Self::from_toml(toml_config, config_file);
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {config_file}"))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration from a path, falling back to defaults when the file
    /// does not exist. Environment overrides are applied afterwards.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            warn!(path = %path.display(), "config_file_missing_using_defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID from the environment
    pub fn apply_env_overrides(&mut self) {
        let token = env::var("TELEGRAM_BOT_TOKEN").ok().filter(|v| !v.is_empty());
        let chat_id = env::var("TELEGRAM_CHAT_ID").ok().filter(|v| !v.is_empty());
        let from_env = token.is_some() && chat_id.is_some();

        if let Some(token) = token {
            self.telegram_bot_token = Some(token);
        }
        if let Some(chat_id) = chat_id {
            self.telegram_chat_id = Some(chat_id);
        }
        if from_env {
            self.telegram_enabled = true;
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.counter.validate()?;

        let (min, max) = (self.min_distance_cm, self.trigger_distance_cm);
        if !(min >= 0.0 && min < max && max.is_finite()) {
            return Err(ConfigError::InvalidTriggerRange { min, max });
        }
        let near = self.near_capacity_ratio;
        if !(near > 0.0 && near <= 1.0) {
            return Err(ConfigError::InvalidNearCapacityRatio(near));
        }
        if self.dispatch_queue_size == 0 {
            return Err(ConfigError::ZeroValue("dispatch.queue_size"));
        }
        if self.dispatch_max_attempts == 0 {
            return Err(ConfigError::ZeroValue("dispatch.max_attempts"));
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("dispatch.timeout_ms"));
        }
        if self.metrics_interval_secs == 0 {
            return Err(ConfigError::ZeroValue("metrics.interval_secs"));
        }
        if self.stats_interval_secs == 0 {
            return Err(ConfigError::ZeroValue("metrics.stats_interval_secs"));
        }
        Ok(())
    }

    /// True if `distance_cm` is inside the trigger zone
    #[inline]
    pub fn is_trigger(&self, distance_cm: f64) -> bool {
        distance_cm > self.min_distance_cm && distance_cm < self.trigger_distance_cm
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn trigger_distance_cm(&self) -> f64 {
        self.trigger_distance_cm
    }

    pub fn min_distance_cm(&self) -> f64 {
        self.min_distance_cm
    }

    pub fn near_capacity_ratio(&self) -> f64 {
        self.near_capacity_ratio
    }

    pub fn counter_settings(&self) -> CounterSettings {
        self.counter
    }

    pub fn max_capacity(&self) -> u32 {
        self.counter.max_capacity
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn source_device(&self) -> &str {
        &self.source_device
    }

    pub fn source_baud(&self) -> u32 {
        self.source_baud
    }

    pub fn source_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.source_reconnect_delay_ms)
    }

    pub fn dispatch_queue_size(&self) -> usize {
        self.dispatch_queue_size
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn dispatch_max_attempts(&self) -> u32 {
        self.dispatch_max_attempts
    }

    pub fn dispatch_backoff(&self) -> Duration {
        Duration::from_millis(self.dispatch_backoff_ms)
    }

    pub fn telegram_enabled(&self) -> bool {
        self.telegram_enabled
    }

    pub fn telegram_bot_token(&self) -> Option<&str> {
        self.telegram_bot_token.as_deref()
    }

    pub fn telegram_chat_id(&self) -> Option<&str> {
        self.telegram_chat_id.as_deref()
    }

    pub fn webhook_enabled(&self) -> bool {
        self.webhook_enabled
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt_enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn stats_interval_secs(&self) -> u64 {
        self.stats_interval_secs
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to override counter settings
    pub fn with_counter_settings(mut self, settings: CounterSettings) -> Self {
        self.counter = settings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "room");
        assert_eq!(config.max_capacity(), 50);
        assert_eq!(config.counter_settings(), CounterSettings::default());
        assert_eq!(config.source_kind(), SourceKind::Serial);
        assert_eq!(config.dispatch_max_attempts(), 3);
        assert_eq!(config.http_port(), 9090);
        assert!(!config.telegram_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_is_trigger_bounds_exclusive() {
        let config = Config::default();
        assert!(config.is_trigger(50.0));
        assert!(!config.is_trigger(2.0));
        assert!(!config.is_trigger(100.0));
        assert!(!config.is_trigger(400.0));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let settings = CounterSettings { max_capacity: 0, ..Default::default() };
        assert_eq!(settings.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn test_validate_rejects_negative_cooldown() {
        let settings = CounterSettings { cooldown_secs: -1.0, ..Default::default() };
        assert_eq!(
            settings.validate(),
            Err(ConfigError::InvalidDuration { field: "cooldown", value: -1.0 })
        );
    }

    #[test]
    fn test_validate_rejects_nan_cooldown() {
        let settings = CounterSettings { notification_cooldown_secs: f64::NAN, ..Default::default() };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidDuration { field: "notification_cooldown", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unrepresentable_durations() {
        let settings = CounterSettings { notification_cooldown_secs: 1e20, ..Default::default() };
        assert_eq!(
            settings.validate(),
            Err(ConfigError::InvalidDuration { field: "notification_cooldown", value: 1e20 })
        );

        let settings = CounterSettings { mass_event_window_secs: f64::INFINITY, ..Default::default() };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidDuration { field: "mass_event_window", .. })
        ));

        // Large but representable values convert without panicking
        let settings = CounterSettings { cooldown_secs: 1e18, ..Default::default() };
        assert!(settings.validate().is_ok());
        assert_eq!(settings.cooldown().as_secs(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_validate_rejects_inverted_ratios() {
        let settings =
            CounterSettings { capacity_set_ratio: 0.8, capacity_clear_ratio: 0.9, ..Default::default() };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidRatios { .. })));

        let settings = CounterSettings { capacity_set_ratio: 1.2, ..Default::default() };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidRatios { .. })));
    }

    #[test]
    fn test_validate_rejects_empty_window_and_threshold() {
        let settings = CounterSettings { mass_event_window_secs: 0.0, ..Default::default() };
        assert_eq!(settings.validate(), Err(ConfigError::ZeroWindow));

        let settings = CounterSettings { mass_event_threshold: 0, ..Default::default() };
        assert_eq!(settings.validate(), Err(ConfigError::ZeroBurstThreshold));
    }

    #[test]
    fn test_settings_update_overlays_given_fields() {
        let update: SettingsUpdate =
            serde_json::from_str(r#"{"max_capacity": 8, "capacity_clear_ratio": 0.5}"#).unwrap();
        let merged = update.apply_to(CounterSettings::default());

        assert_eq!(merged.max_capacity, 8);
        assert_eq!(merged.capacity_clear_ratio, 0.5);
        assert_eq!(merged.cooldown_secs, 2.0);
        assert_eq!(merged.notification_cooldown_secs, 300.0);
        assert!(serde_json::from_str::<SettingsUpdate>(r#"{"capacity": 8}"#).is_err());
    }

    #[test]
    fn test_durations_from_settings() {
        let settings = CounterSettings::default();
        assert_eq!(settings.cooldown(), Duration::from_secs(2));
        assert_eq!(settings.mass_event_window(), Duration::from_secs(3));
        assert_eq!(settings.alert_policy_config().notification_cooldown, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let config = Config::from_toml_str("[occupancy]\nmax_capacity = 5\n", "inline").unwrap();
        assert_eq!(config.max_capacity(), 5);
        assert!((config.near_capacity_ratio() - 0.8).abs() < 1e-9);
        assert_eq!(config.counter_settings().mass_event_threshold, 3);
        assert_eq!(config.config_file(), "inline");
    }

    #[test]
    fn test_invalid_trigger_range_rejected() {
        let err = Config::from_toml_str(
            "[sensors]\ntrigger_distance_cm = 1.0\nmin_distance_cm = 2.0\n",
            "inline",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("trigger range"));
    }
}
