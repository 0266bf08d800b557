//! occupancy-sense - people counter for a single monitored doorway
//!
//! Two ranging sensors (entry, exit) feed a debounced occupancy count with
//! capacity blocking, burst detection and hysteresis-based alerts.
//!
//! Module structure:
//! - `domain/` - Core types (samples, snapshots, alerts)
//! - `io/` - External interfaces (serial/stdin sources, notifiers, HTTP)
//! - `services/` - Pipeline (debounce, occupancy, bursts, alert policy, dispatcher)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use occupancy_sense::infra::{Config, Metrics, SourceKind};
use occupancy_sense::io::mqtt_alerts::run_event_loop;
use occupancy_sense::io::{
    start_status_server, MqttNotifier, SerialSource, StatusState, StdinSource, TelegramNotifier,
    WebhookNotifier,
};
use occupancy_sense::services::{
    create_dispatcher, CounterHandle, LogNotifier, Notifier, PeopleCounter, RetryPolicy,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Occupancy sensing node
#[derive(Parser, Debug)]
#[command(name = "occupancy-sense", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Read samples from stdin instead of the configured source
    #[arg(long)]
    stdin: bool,
}

/// Capacity of the sample channel between sources and the counter
const SAMPLE_CHANNEL_SIZE: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-trigger detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "occupancy-sense starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config)?;
    let source_kind = if args.stdin { SourceKind::Stdin } else { config.source_kind() };

    let settings = config.counter_settings();
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        max_capacity = %settings.max_capacity,
        cooldown_secs = %settings.cooldown_secs,
        trigger_distance_cm = %config.trigger_distance_cm(),
        mass_event_threshold = %settings.mass_event_threshold,
        mass_event_window_secs = %settings.mass_event_window_secs,
        source = ?source_kind,
        telegram = %config.telegram_enabled(),
        webhook = %config.webhook_enabled(),
        mqtt = %config.mqtt_enabled(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Notification channels
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if config.telegram_enabled() {
        match (config.telegram_bot_token(), config.telegram_chat_id()) {
            (Some(token), Some(chat_id)) => {
                let telegram = TelegramNotifier::new(token, chat_id, config.dispatch_timeout())
                    .context("Failed to build Telegram client")?;
                notifiers.push(Arc::new(telegram));
            }
            _ => warn!("telegram_enabled_without_credentials"),
        }
    }
    if config.webhook_enabled() {
        let webhook = WebhookNotifier::new(config.webhook_url(), config.dispatch_timeout())
            .context("Failed to build webhook client")?;
        info!(url = %webhook.url(), "webhook_notifier_enabled");
        notifiers.push(Arc::new(webhook));
    }
    if config.mqtt_enabled() {
        let (mqtt, eventloop) = MqttNotifier::new(&config);
        info!(host = %config.mqtt_host(), topic = %mqtt.topic(), "mqtt_notifier_enabled");
        tokio::spawn(run_event_loop(eventloop, shutdown_rx.clone()));
        notifiers.push(Arc::new(mqtt));
    }

    let retry = RetryPolicy {
        max_attempts: config.dispatch_max_attempts(),
        backoff: config.dispatch_backoff(),
        timeout: config.dispatch_timeout(),
    };
    let (alert_sender, dispatcher) =
        create_dispatcher(notifiers, retry, metrics.clone(), config.dispatch_queue_size());
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let mut counter = PeopleCounter::new(&config, metrics.clone(), Some(alert_sender))
        .context("Invalid counter configuration")?;

    // Sample source
    let (sample_tx, sample_rx) = mpsc::channel(SAMPLE_CHANNEL_SIZE);
    match source_kind {
        SourceKind::Serial => {
            let source = SerialSource::new(&config, sample_tx, metrics.clone());
            tokio::spawn(source.run(shutdown_rx.clone()));
        }
        SourceKind::Stdin => {
            let source = StdinSource::new(sample_tx, metrics.clone());
            tokio::spawn(source.run(shutdown_rx.clone()));
        }
    }

    // Admin commands
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let handle = CounterHandle::new(cmd_tx);

    // Status server (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let state = StatusState {
            metrics: metrics.clone(),
            site_id: Arc::from(config.site_id()),
            snapshots: counter.subscribe(),
            counter: handle.clone(),
        };
        let server_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_status_server(http_port, state, server_shutdown).await {
                tracing::error!(error = %e, "status server error");
            }
        });
    }

    // Metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run counter - consumes samples until the source closes or shutdown
    counter.run(sample_rx, cmd_rx, shutdown_rx).await;

    // Dropping the counter closes the alert queue; give in-flight alerts a
    // bounded chance to go out
    drop(counter);
    drop(handle);
    let drain_limit = config.dispatch_timeout() * config.dispatch_max_attempts();
    if tokio::time::timeout(drain_limit, dispatcher_task).await.is_err() {
        warn!("dispatcher_drain_timeout");
    }

    info!("occupancy-sense shutdown complete");
    Ok(())
}
