//! Alert policy - hysteresis and notification cooldown
//!
//! Two independent axes:
//! - Capacity: `Normal` / `AtCapacity`, set at `set_ratio`, cleared only
//!   below `clear_ratio`. Raising (and re-raising) is rate limited by the
//!   notification cooldown; clearing is not.
//! - Burst: a `MassEvent` on the rising edge of the detector's burst flag,
//!   then again for each further window the burst is sustained.
//!
//! State is updated as soon as an alert is decided. Whether the notification
//! is later delivered has no effect here.

use crate::domain::alert::AlertKind;
use std::time::{Duration, Instant};
use tracing::debug;

/// Thresholds and cooldown for the policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertPolicyConfig {
    /// Ratio at or above which the capacity alert is raised
    pub set_ratio: f64,
    /// Ratio strictly below which an active capacity alert clears
    pub clear_ratio: f64,
    /// Minimum time between two capacity alert notifications
    pub notification_cooldown: Duration,
    /// Sliding window of the burst detector; a sustained burst re-alerts once per window
    pub burst_window: Duration,
}

impl Default for AlertPolicyConfig {
    fn default() -> Self {
        Self {
            set_ratio: 1.0,
            clear_ratio: 0.9,
            notification_cooldown: Duration::from_secs(300),
            burst_window: Duration::from_secs(3),
        }
    }
}

/// Capacity axis state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityState {
    Normal,
    AtCapacity,
}

/// Mutable alert state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertState {
    pub capacity_alert_active: bool,
    pub last_capacity_notification: Option<Instant>,
    pub mass_event_active: bool,
    pub last_mass_event: Option<Instant>,
}

/// Alert policy engine
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    config: AlertPolicyConfig,
    state: AlertState,
}

impl AlertPolicy {
    pub fn new(config: AlertPolicyConfig) -> Self {
        Self { config, state: AlertState::default() }
    }

    /// Evaluate the capacity axis at occupancy `ratio`
    pub fn evaluate_capacity(&mut self, ratio: f64, now: Instant) -> Option<AlertKind> {
        if ratio >= self.config.set_ratio {
            if !self.cooldown_elapsed(now) {
                debug!(
                    ratio = %ratio,
                    active = %self.state.capacity_alert_active,
                    "capacity_alert_suppressed"
                );
                return None;
            }
            self.state.capacity_alert_active = true;
            self.state.last_capacity_notification = Some(now);
            return Some(AlertKind::CapacityAlert);
        }

        if self.state.capacity_alert_active && ratio < self.config.clear_ratio {
            self.state.capacity_alert_active = false;
            return Some(AlertKind::CapacityCleared);
        }

        None
    }

    /// Evaluate the burst axis with the detector's current flag
    pub fn evaluate_burst(&mut self, bursting: bool, now: Instant) -> Option<AlertKind> {
        let was_active = self.state.mass_event_active;
        self.state.mass_event_active = bursting;
        if !bursting {
            return None;
        }

        let window_elapsed = match self.state.last_mass_event {
            None => true,
            Some(last) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed >= self.config.burst_window),
        };
        if was_active && !window_elapsed {
            return None;
        }

        self.state.last_mass_event = Some(now);
        Some(AlertKind::MassEvent)
    }

    pub fn capacity_state(&self) -> CapacityState {
        if self.state.capacity_alert_active {
            CapacityState::AtCapacity
        } else {
            CapacityState::Normal
        }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    /// Replace thresholds; current alert state is kept
    pub fn reconfigure(&mut self, config: AlertPolicyConfig) {
        self.config = config;
    }

    pub fn reset(&mut self) {
        self.state = AlertState::default();
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.state.last_capacity_notification {
            None => true,
            Some(last) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed >= self.config.notification_cooldown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AlertPolicy {
        AlertPolicy::new(AlertPolicyConfig::default())
    }

    fn ratio(inside: u32, capacity: u32) -> f64 {
        inside as f64 / capacity as f64
    }

    #[test]
    fn test_reaching_capacity_raises_alert() {
        let mut p = policy();
        let t0 = Instant::now();

        assert_eq!(p.evaluate_capacity(ratio(4, 5), t0), None);
        assert_eq!(p.evaluate_capacity(ratio(5, 5), t0), Some(AlertKind::CapacityAlert));
        assert_eq!(p.capacity_state(), CapacityState::AtCapacity);
        assert_eq!(p.state().last_capacity_notification, Some(t0));
    }

    #[test]
    fn test_no_duplicate_alert_within_cooldown() {
        let mut p = policy();
        let t0 = Instant::now();

        p.evaluate_capacity(1.0, t0);
        assert_eq!(p.evaluate_capacity(1.0, t0 + Duration::from_secs(10)), None);
        assert_eq!(p.evaluate_capacity(1.0, t0 + Duration::from_secs(299)), None);
        assert_eq!(
            p.evaluate_capacity(1.0, t0 + Duration::from_secs(300)),
            Some(AlertKind::CapacityAlert)
        );
    }

    #[test]
    fn test_clear_requires_ratio_below_clear_threshold() {
        let mut p = policy();
        let t0 = Instant::now();
        p.evaluate_capacity(ratio(10, 10), t0);

        // 9/10 = 0.9 is not below 0.9
        assert_eq!(p.evaluate_capacity(ratio(9, 10), t0), None);
        assert_eq!(p.capacity_state(), CapacityState::AtCapacity);
        assert_eq!(p.evaluate_capacity(ratio(8, 10), t0), Some(AlertKind::CapacityCleared));
        assert_eq!(p.capacity_state(), CapacityState::Normal);
    }

    #[test]
    fn test_clear_emitted_once() {
        let mut p = policy();
        let t0 = Instant::now();
        p.evaluate_capacity(ratio(5, 5), t0);

        assert_eq!(p.evaluate_capacity(ratio(4, 5), t0), Some(AlertKind::CapacityCleared));
        assert_eq!(p.evaluate_capacity(ratio(3, 5), t0), None);
        assert_eq!(p.evaluate_capacity(ratio(4, 5), t0), None);
    }

    #[test]
    fn test_clear_does_not_consume_cooldown() {
        let mut p = policy();
        let t0 = Instant::now();
        p.evaluate_capacity(1.0, t0);
        p.evaluate_capacity(0.8, t0 + Duration::from_secs(1));

        assert_eq!(p.state().last_capacity_notification, Some(t0));
        // Refilling inside the cooldown stays quiet and the state stays Normal
        assert_eq!(p.evaluate_capacity(1.0, t0 + Duration::from_secs(2)), None);
        assert_eq!(p.capacity_state(), CapacityState::Normal);
        assert_eq!(
            p.evaluate_capacity(1.0, t0 + Duration::from_secs(301)),
            Some(AlertKind::CapacityAlert)
        );
    }

    #[test]
    fn test_cooldown_rejects_earlier_timestamp() {
        let mut p = policy();
        let t0 = Instant::now() + Duration::from_secs(1000);
        p.evaluate_capacity(1.0, t0);
        p.evaluate_capacity(0.0, t0);

        assert_eq!(p.evaluate_capacity(1.0, t0 - Duration::from_secs(500)), None);
    }

    #[test]
    fn test_custom_set_ratio() {
        let mut p = AlertPolicy::new(AlertPolicyConfig {
            set_ratio: 0.8,
            clear_ratio: 0.5,
            notification_cooldown: Duration::ZERO,
            ..AlertPolicyConfig::default()
        });
        let t0 = Instant::now();

        assert_eq!(p.evaluate_capacity(0.8, t0), Some(AlertKind::CapacityAlert));
        assert_eq!(p.evaluate_capacity(0.6, t0), None);
        assert_eq!(p.evaluate_capacity(0.4, t0), Some(AlertKind::CapacityCleared));
    }

    #[test]
    fn test_burst_alert_on_rising_edge() {
        let mut p = policy();
        let t0 = Instant::now();
        let at = |ms: u64| t0 + Duration::from_millis(ms);

        assert_eq!(p.evaluate_burst(false, at(0)), None);
        assert_eq!(p.evaluate_burst(true, at(100)), Some(AlertKind::MassEvent));
        assert_eq!(p.evaluate_burst(true, at(600)), None);
        assert!(p.state().mass_event_active);
        assert_eq!(p.evaluate_burst(false, at(900)), None);
        assert_eq!(p.evaluate_burst(true, at(1200)), Some(AlertKind::MassEvent));
    }

    #[test]
    fn test_sustained_burst_realerts_once_per_window() {
        let mut p = policy();
        let t0 = Instant::now();
        let at = |ms: u64| t0 + Duration::from_millis(ms);

        assert_eq!(p.evaluate_burst(true, at(0)), Some(AlertKind::MassEvent));
        assert_eq!(p.evaluate_burst(true, at(2999)), None);
        assert_eq!(p.evaluate_burst(true, at(3000)), Some(AlertKind::MassEvent));
        assert_eq!(p.state().last_mass_event, Some(at(3000)));
        assert_eq!(p.evaluate_burst(true, at(5000)), None);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut p = policy();
        let t0 = Instant::now();
        p.evaluate_capacity(1.0, t0);
        p.evaluate_burst(true, t0);
        p.reset();

        assert_eq!(p.state(), &AlertState::default());
        assert_eq!(p.evaluate_capacity(1.0, t0), Some(AlertKind::CapacityAlert));
    }
}
