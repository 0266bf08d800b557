//! People counter - owns the sensing pipeline state
//!
//! The PeopleCounter is the single writer for every piece of core state:
//! - Per-sensor debounce clocks
//! - Occupancy counts and capacity blocking
//! - Burst window
//! - Alert hysteresis and notification cooldown
//!
//! Alerts leave through the dispatcher queue with `try_send`; nothing here
//! waits on I/O. Readers get immutable snapshots over a `watch` channel.

#[cfg(test)]
mod tests;

use crate::domain::alert::{AlertEvent, AlertKind};
use crate::domain::types::{EventOutcome, ObservedEvent, OccupancySnapshot, SensorId, SensorSample};
use crate::infra::config::{Config, ConfigError, CounterSettings};
use crate::infra::metrics::Metrics;
use crate::services::alert_policy::AlertPolicy;
use crate::services::debounce::DebounceFilter;
use crate::services::dispatcher::AlertSender;
use crate::services::mass_event::MassEventDetector;
use crate::services::occupancy::{CounterError, OccupancyCounter};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Admin requests handled inside the run loop
#[derive(Debug)]
pub enum CounterCommand {
    /// Clear counts, debounce clocks, burst window and alert state
    Reset { reply: oneshot::Sender<OccupancySnapshot> },
    SetMaxCapacity {
        max_capacity: u32,
        reply: oneshot::Sender<Result<OccupancySnapshot, ConfigError>>,
    },
    Configure {
        settings: CounterSettings,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Settings { reply: oneshot::Sender<CounterSettings> },
}

/// Failure of an admin request sent through a [`CounterHandle`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("counter task is not running")]
    Unavailable,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Cloneable admin handle for the running counter
#[derive(Debug, Clone)]
pub struct CounterHandle {
    tx: mpsc::Sender<CounterCommand>,
}

impl CounterHandle {
    pub fn new(tx: mpsc::Sender<CounterCommand>) -> Self {
        Self { tx }
    }

    pub async fn reset(&self) -> Result<OccupancySnapshot, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.request(CounterCommand::Reset { reply }, rx).await
    }

    pub async fn set_max_capacity(&self, max_capacity: u32) -> Result<OccupancySnapshot, CommandError> {
        let (reply, rx) = oneshot::channel();
        Ok(self.request(CounterCommand::SetMaxCapacity { max_capacity, reply }, rx).await??)
    }

    pub async fn configure(&self, settings: CounterSettings) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        Ok(self.request(CounterCommand::Configure { settings, reply }, rx).await??)
    }

    pub async fn settings(&self) -> Result<CounterSettings, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.request(CounterCommand::Settings { reply }, rx).await
    }

    async fn request<T>(
        &self,
        cmd: CounterCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, CommandError> {
        self.tx.send(cmd).await.map_err(|_| CommandError::Unavailable)?;
        rx.await.map_err(|_| CommandError::Unavailable)
    }
}

/// Sensing pipeline: debounce, occupancy, burst detection, alert policy
pub struct PeopleCounter {
    /// Trigger zone and site identity; counter options live in `settings`
    config: Config,
    settings: CounterSettings,
    pub(crate) debounce: DebounceFilter,
    pub(crate) occupancy: OccupancyCounter,
    pub(crate) mass_event: MassEventDetector,
    pub(crate) policy: AlertPolicy,
    metrics: Arc<Metrics>,
    alert_sender: Option<AlertSender>,
    snapshot_tx: watch::Sender<OccupancySnapshot>,
    stats_interval: Duration,
}

impl PeopleCounter {
    /// Build a counter from validated configuration
    pub fn new(
        config: &Config,
        metrics: Arc<Metrics>,
        alert_sender: Option<AlertSender>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let settings = config.counter_settings();

        let occupancy = OccupancyCounter::new(settings.max_capacity)?
            .with_near_capacity_ratio(config.near_capacity_ratio());
        let initial = occupancy.snapshot();
        let (snapshot_tx, _) = watch::channel(initial);
        metrics.set_occupancy(initial.inside, initial.max_capacity);

        Ok(Self {
            config: config.clone(),
            settings,
            debounce: DebounceFilter::new(settings.cooldown()),
            occupancy,
            mass_event: MassEventDetector::new(
                settings.mass_event_threshold,
                settings.mass_event_window(),
            ),
            policy: AlertPolicy::new(settings.alert_policy_config()),
            metrics,
            alert_sender,
            snapshot_tx,
            stats_interval: Duration::from_secs(config.stats_interval_secs()),
        })
    }

    /// Receiver that always holds the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<OccupancySnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn settings(&self) -> &CounterSettings {
        &self.settings
    }

    /// Current counts. Pure read.
    pub fn snapshot(&self) -> OccupancySnapshot {
        self.occupancy.snapshot()
    }

    /// Process one raw reading
    ///
    /// Returns `None` when the reading is outside the trigger zone or is
    /// swallowed by the debounce filter; otherwise the event and the alerts
    /// it raised.
    pub fn ingest_sample(
        &mut self,
        sensor_id: SensorId,
        distance_cm: f64,
        timestamp: Instant,
    ) -> Option<ObservedEvent> {
        let start = Instant::now();

        let triggered = self.config.is_trigger(distance_cm);
        self.metrics.record_sample(triggered);
        if !triggered {
            return None;
        }

        if !self.debounce.accept(sensor_id, timestamp) {
            self.metrics.record_debounced();
            return None;
        }

        let (outcome, snapshot) = match sensor_id {
            SensorId::Entry => match self.occupancy.accept_entry() {
                Ok(snapshot) => {
                    self.metrics.record_entry(true);
                    info!(
                        entries = %snapshot.entries,
                        inside = %snapshot.inside,
                        max_capacity = %snapshot.max_capacity,
                        distance_cm = %distance_cm,
                        "entry_admitted"
                    );
                    (EventOutcome::Admitted, snapshot)
                }
                Err(CounterError::CapacityExceeded { inside, max_capacity }) => {
                    self.metrics.record_entry(false);
                    warn!(inside = %inside, max_capacity = %max_capacity, "entry_denied");
                    (EventOutcome::Denied, self.occupancy.snapshot())
                }
            },
            SensorId::Exit => {
                let snapshot = self.occupancy.accept_exit();
                self.metrics.record_exit();
                info!(
                    exits = %snapshot.exits,
                    inside = %snapshot.inside,
                    max_capacity = %snapshot.max_capacity,
                    distance_cm = %distance_cm,
                    "exit_counted"
                );
                (EventOutcome::Exited, snapshot)
            }
        };

        let bursting = self.mass_event.observe(timestamp);
        let burst_count = self.mass_event.count();

        let mut alerts = Vec::new();
        if let Some(kind) = self.policy.evaluate_capacity(snapshot.ratio, timestamp) {
            alerts.push(kind);
        }
        if let Some(kind) = self.policy.evaluate_burst(bursting, timestamp) {
            self.metrics.record_burst();
            alerts.push(kind);
        }
        for &kind in &alerts {
            self.raise(kind, snapshot);
        }

        self.publish(snapshot);
        self.metrics.record_event_processed(start.elapsed().as_micros() as u64);

        Some(ObservedEvent {
            sensor_id,
            distance_cm,
            timestamp,
            outcome,
            snapshot,
            burst_count,
            alerts,
        })
    }

    /// Convenience wrapper for a sample from a source
    pub fn ingest(&mut self, sample: SensorSample) -> Option<ObservedEvent> {
        self.ingest_sample(sample.sensor_id, sample.distance_cm, sample.timestamp)
    }

    /// Re-evaluate the capacity axis without a new event
    ///
    /// Lets a reminder go out once the cooldown expires while the room
    /// stays full, and picks up a capacity change that made the room full.
    pub fn tick(&mut self, now: Instant) -> Option<AlertKind> {
        let snapshot = self.occupancy.snapshot();
        let kind = self.policy.evaluate_capacity(snapshot.ratio, now)?;
        self.raise(kind, snapshot);
        Some(kind)
    }

    /// Apply new runtime options. Invalid settings leave everything as is.
    pub fn configure(&mut self, settings: CounterSettings) -> Result<(), ConfigError> {
        settings.validate()?;

        self.occupancy.set_max_capacity(settings.max_capacity)?;
        self.debounce.set_cooldown(settings.cooldown());
        self.mass_event
            .reconfigure(settings.mass_event_threshold, settings.mass_event_window());
        self.policy.reconfigure(settings.alert_policy_config());
        self.settings = settings;

        info!(
            max_capacity = %settings.max_capacity,
            cooldown_secs = %settings.cooldown_secs,
            mass_event_threshold = %settings.mass_event_threshold,
            mass_event_window_secs = %settings.mass_event_window_secs,
            set_ratio = %settings.capacity_set_ratio,
            clear_ratio = %settings.capacity_clear_ratio,
            "counter_configured"
        );
        self.publish(self.occupancy.snapshot());
        Ok(())
    }

    pub fn set_max_capacity(&mut self, max_capacity: u32) -> Result<OccupancySnapshot, ConfigError> {
        self.occupancy.set_max_capacity(max_capacity)?;
        self.settings.max_capacity = max_capacity;

        let snapshot = self.occupancy.snapshot();
        info!(max_capacity = %max_capacity, inside = %snapshot.inside, "max_capacity_changed");
        self.publish(snapshot);
        Ok(snapshot)
    }

    /// System reset. Configuration is kept.
    pub fn reset(&mut self) -> OccupancySnapshot {
        self.occupancy.reset();
        self.debounce.reset();
        self.mass_event.reset();
        self.policy.reset();

        let snapshot = self.occupancy.snapshot();
        info!(max_capacity = %snapshot.max_capacity, "system_reset");
        self.publish(snapshot);
        snapshot
    }

    /// Run until the sample source closes or shutdown is signalled
    pub async fn run(
        &mut self,
        mut samples_rx: mpsc::Receiver<SensorSample>,
        mut commands_rx: mpsc::Receiver<CounterCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut policy_tick = interval(Duration::from_secs(1));
        let mut stats_tick = interval(self.stats_interval);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        info!(
            site = %self.config.site_id(),
            max_capacity = %self.settings.max_capacity,
            "counter_started"
        );

        loop {
            tokio::select! {
                sample = samples_rx.recv() => {
                    match sample {
                        Some(sample) => {
                            self.ingest(sample);
                        }
                        None => {
                            info!("sample_source_closed");
                            break;
                        }
                    }
                }
                cmd = commands_rx.recv(), if commands_open => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => commands_open = false,
                    }
                }
                _ = policy_tick.tick() => {
                    self.tick(Instant::now());
                }
                _ = stats_tick.tick() => {
                    self.log_stats();
                }
                _ = shutdown.changed() => {
                    info!("counter_shutdown");
                    break;
                }
            }
        }

        self.log_stats();
    }

    fn handle_command(&mut self, cmd: CounterCommand) {
        debug!(cmd = ?cmd, "counter_command");
        match cmd {
            CounterCommand::Reset { reply } => {
                let _ = reply.send(self.reset());
            }
            CounterCommand::SetMaxCapacity { max_capacity, reply } => {
                let _ = reply.send(self.set_max_capacity(max_capacity));
            }
            CounterCommand::Configure { settings, reply } => {
                let result = self.configure(settings);
                if let Err(e) = &result {
                    warn!(error = %e, "configure_rejected");
                }
                let _ = reply.send(result);
            }
            CounterCommand::Settings { reply } => {
                let _ = reply.send(self.settings);
            }
        }
    }

    /// Periodic occupancy line
    pub fn log_stats(&self) {
        let snapshot = self.occupancy.snapshot();
        info!(
            entries = %snapshot.entries,
            exits = %snapshot.exits,
            inside = %snapshot.inside,
            max_capacity = %snapshot.max_capacity,
            utilization_pct = %format!("{:.1}", snapshot.percent()),
            status = %snapshot.status.as_str(),
            capacity_alert_active = %self.policy.state().capacity_alert_active,
            "occupancy_stats"
        );
    }

    fn raise(&self, kind: AlertKind, snapshot: OccupancySnapshot) {
        let mut alert = AlertEvent::new(kind, self.config.site_id(), snapshot);
        if kind == AlertKind::MassEvent {
            alert = alert.with_burst(
                self.mass_event.count(),
                self.mass_event.window_duration().as_secs_f64(),
            );
        }

        match kind {
            AlertKind::CapacityAlert => warn!(
                alert_id = %alert.id,
                inside = %snapshot.inside,
                max_capacity = %snapshot.max_capacity,
                "capacity_alert_raised"
            ),
            AlertKind::CapacityCleared => info!(
                alert_id = %alert.id,
                inside = %snapshot.inside,
                max_capacity = %snapshot.max_capacity,
                "capacity_alert_cleared"
            ),
            AlertKind::MassEvent => warn!(
                alert_id = %alert.id,
                burst_count = %self.mass_event.count(),
                window_secs = %self.mass_event.window_duration().as_secs_f64(),
                "mass_event_detected"
            ),
        }

        if let Some(sender) = &self.alert_sender {
            sender.send(alert);
        }
    }

    fn publish(&self, snapshot: OccupancySnapshot) {
        self.metrics.set_occupancy(snapshot.inside, snapshot.max_capacity);
        self.snapshot_tx.send_replace(snapshot);
    }
}
