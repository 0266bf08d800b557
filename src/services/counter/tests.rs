//! Tests for the PeopleCounter module

use super::*;
use crate::domain::types::OccupancyStatus;
use crate::services::dispatcher::{create_dispatcher, NotificationDispatcher, RetryPolicy};

/// Test harness that keeps the dispatcher worker (and its receiver) alive so
/// `try_send` succeeds
struct TestCounter {
    counter: PeopleCounter,
    metrics: Arc<Metrics>,
    #[allow(dead_code)]
    worker: NotificationDispatcher,
    t0: Instant,
}

impl std::ops::Deref for TestCounter {
    type Target = PeopleCounter;
    fn deref(&self) -> &Self::Target {
        &self.counter
    }
}

impl std::ops::DerefMut for TestCounter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.counter
    }
}

impl TestCounter {
    fn at(&self, secs: f64) -> Instant {
        self.t0 + Duration::from_secs_f64(secs)
    }

    fn entry(&mut self, secs: f64) -> Option<ObservedEvent> {
        let ts = self.at(secs);
        self.counter.ingest_sample(SensorId::Entry, 50.0, ts)
    }

    fn exit(&mut self, secs: f64) -> Option<ObservedEvent> {
        let ts = self.at(secs);
        self.counter.ingest_sample(SensorId::Exit, 50.0, ts)
    }
}

fn settings(max_capacity: u32) -> CounterSettings {
    CounterSettings {
        max_capacity,
        // High threshold keeps bursts out of the capacity tests
        mass_event_threshold: 100,
        ..CounterSettings::default()
    }
}

fn create_test_counter(settings: CounterSettings) -> TestCounter {
    let config = Config::default().with_counter_settings(settings);
    let metrics = Arc::new(Metrics::new());
    let (sender, worker) = create_dispatcher(Vec::new(), RetryPolicy::default(), metrics.clone(), 64);
    let counter = PeopleCounter::new(&config, metrics.clone(), Some(sender))
        .expect("default config is valid");
    TestCounter { counter, metrics, worker, t0: Instant::now() }
}

fn alerts(event: Option<ObservedEvent>) -> Vec<AlertKind> {
    event.map(|e| e.alerts).unwrap_or_default()
}

fn assert_inside_invariant(snapshot: &OccupancySnapshot) {
    let expected = snapshot.entries.saturating_sub(snapshot.exits);
    assert_eq!(snapshot.inside as u64, expected.min(u32::MAX as u64));
}

#[test]
fn test_readings_outside_trigger_zone_are_ignored() {
    let mut c = create_test_counter(settings(5));
    let t = c.at(0.0);

    for distance in [0.0, 1.5, 2.0, 100.0, 250.0] {
        assert!(c.ingest_sample(SensorId::Entry, distance, t).is_none());
    }
    assert_eq!(c.snapshot().entries, 0);
    assert_eq!(c.metrics.samples_total(), 5);

    // Debounce clock untouched by the ignored readings
    let event = c.ingest_sample(SensorId::Entry, 99.9, t).expect("trigger accepted");
    assert_eq!(event.outcome, EventOutcome::Admitted);
}

#[test]
fn test_same_sensor_within_cooldown_counted_once() {
    let mut c = create_test_counter(settings(10));

    assert!(c.entry(0.0).is_some());
    assert!(c.entry(0.5).is_none());
    assert!(c.entry(1.99).is_none());
    assert!(c.entry(2.0).is_some());

    assert_eq!(c.snapshot().entries, 2);
}

#[test]
fn test_sensors_debounced_independently() {
    let mut c = create_test_counter(settings(10));

    assert!(c.entry(0.0).is_some());
    assert!(c.exit(0.0).is_some());

    let snapshot = c.snapshot();
    assert_eq!(snapshot.entries, 1);
    assert_eq!(snapshot.exits, 1);
    assert_eq!(snapshot.inside, 0);
}

#[test]
fn test_end_to_end_capacity_five() {
    let mut c = create_test_counter(settings(5));

    for i in 0..4 {
        let event = c.entry(i as f64 * 2.0).expect("entry accepted");
        assert_eq!(event.outcome, EventOutcome::Admitted);
        assert!(event.alerts.is_empty());
    }

    let fifth = c.entry(8.0).expect("entry accepted");
    assert_eq!(fifth.outcome, EventOutcome::Admitted);
    assert_eq!(fifth.alerts, vec![AlertKind::CapacityAlert]);
    assert_eq!(fifth.snapshot.status, OccupancyStatus::Occupied);

    let sixth = c.entry(10.0).expect("debounce passed");
    assert_eq!(sixth.outcome, EventOutcome::Denied);
    assert!(sixth.alerts.is_empty());
    assert_eq!(c.snapshot().entries, 5);
    assert_eq!(c.snapshot().inside, 5);

    let exit = c.exit(12.0).expect("exit accepted");
    assert_eq!(exit.snapshot.inside, 4);
    assert_eq!(exit.alerts, vec![AlertKind::CapacityCleared]);
    assert_eq!(exit.snapshot.status, OccupancyStatus::NearCapacity);
    assert_inside_invariant(&exit.snapshot);
}

#[test]
fn test_oscillation_never_repeats_clear() {
    let mut c = create_test_counter(settings(5));
    let mut raised = Vec::new();

    let mut t = 0.0;
    for _ in 0..5 {
        raised.extend(alerts(c.entry(t)));
        t += 2.0;
    }
    for _ in 0..4 {
        raised.extend(alerts(c.exit(t)));
        raised.extend(alerts(c.entry(t)));
        t += 2.0;
    }

    assert_eq!(raised, vec![AlertKind::CapacityAlert, AlertKind::CapacityCleared]);
    assert_eq!(c.snapshot().inside, 5);
}

#[test]
fn test_tick_sends_reminder_after_cooldown() {
    let mut c = create_test_counter(settings(2));
    c.entry(0.0);
    assert_eq!(alerts(c.entry(2.0)), vec![AlertKind::CapacityAlert]);

    let before = c.at(2.0 + 299.0);
    assert_eq!(c.tick(before), None);
    let after = c.at(2.0 + 300.0);
    assert_eq!(c.tick(after), Some(AlertKind::CapacityAlert));
    assert_eq!(c.tick(after), None);
}

#[test]
fn test_refill_inside_cooldown_alerts_on_tick() {
    let mut c = create_test_counter(settings(2));
    c.entry(0.0);
    c.entry(2.0);
    assert_eq!(alerts(c.exit(4.0)), vec![AlertKind::CapacityCleared]);

    // Full again while the cooldown from t=2 is still running
    assert!(alerts(c.entry(6.0)).is_empty());
    let quiet = c.at(60.0);
    assert_eq!(c.tick(quiet), None);
    let due = c.at(302.0);
    assert_eq!(c.tick(due), Some(AlertKind::CapacityAlert));
}

#[test]
fn test_burst_detected_once_per_window() {
    let mut c = create_test_counter(CounterSettings { max_capacity: 50, ..CounterSettings::default() });

    assert!(alerts(c.entry(0.0)).is_empty());
    assert!(alerts(c.exit(0.5)).is_empty());
    let third = c.entry(2.0).expect("entry accepted");
    assert_eq!(third.alerts, vec![AlertKind::MassEvent]);
    assert_eq!(third.burst_count, 3);

    // Still bursting inside the same window: no second alert
    assert!(alerts(c.exit(2.5)).is_empty());
}

#[test]
fn test_sustained_crowd_alerts_once_per_window() {
    let mut c = create_test_counter(CounterSettings {
        max_capacity: 50,
        cooldown_secs: 0.1,
        ..CounterSettings::default()
    });

    // Someone crosses every 0.5 s for 30 s
    let mut bursts = Vec::new();
    for step in 0..60 {
        let secs = step as f64 * 0.5;
        let event = if step % 2 == 0 { c.entry(secs) } else { c.exit(secs) };
        let event = event.expect("outside cooldown");
        if event.alerts.contains(&AlertKind::MassEvent) {
            bursts.push(secs);
        }
    }

    assert_eq!(bursts, vec![1.0, 4.0, 7.0, 10.0, 13.0, 16.0, 19.0, 22.0, 25.0, 28.0]);
    assert_eq!(c.metrics.report().bursts_total, 10);
}

#[test]
fn test_spaced_events_never_burst() {
    let mut c = create_test_counter(CounterSettings { max_capacity: 50, ..CounterSettings::default() });

    let mut t = 0.0;
    for _ in 0..10 {
        let event = c.entry(t).expect("entry accepted");
        assert!(event.alerts.is_empty());
        assert_eq!(event.burst_count, 1);
        t += 3.1;
    }
}

#[test]
fn test_denied_entry_feeds_burst_window() {
    let mut c = create_test_counter(CounterSettings {
        max_capacity: 1,
        cooldown_secs: 0.5,
        ..CounterSettings::default()
    });

    assert_eq!(alerts(c.entry(0.0)), vec![AlertKind::CapacityAlert]);
    assert_eq!(c.entry(0.5).map(|e| e.outcome), Some(EventOutcome::Denied));
    let third = c.entry(1.0).expect("debounce passed");
    assert_eq!(third.outcome, EventOutcome::Denied);
    assert_eq!(third.alerts, vec![AlertKind::MassEvent]);
}

#[test]
fn test_snapshot_is_idempotent_and_published() {
    let mut c = create_test_counter(settings(5));
    let rx = c.subscribe();
    c.entry(0.0);

    assert_eq!(c.snapshot(), c.snapshot());
    assert_eq!(*rx.borrow(), c.snapshot());
    assert_eq!(rx.borrow().inside, 1);
}

#[test]
fn test_reset_keeps_configuration() {
    let mut c = create_test_counter(settings(2));
    c.entry(0.0);
    c.entry(2.0);
    assert!(c.policy.state().capacity_alert_active);

    let snapshot = c.reset();
    assert_eq!(snapshot.entries, 0);
    assert_eq!(snapshot.inside, 0);
    assert_eq!(snapshot.max_capacity, 2);
    assert!(!c.policy.state().capacity_alert_active);
    assert_eq!(c.mass_event.count(), 0);

    // Debounce clock cleared: an entry at the same instant is accepted
    assert!(c.entry(2.0).is_some());
}

#[test]
fn test_configure_rejects_invalid_settings() {
    let mut c = create_test_counter(settings(5));
    c.entry(0.0);

    let bad = CounterSettings { max_capacity: 0, ..settings(5) };
    assert_eq!(c.configure(bad), Err(ConfigError::ZeroCapacity));
    let bad = CounterSettings { cooldown_secs: -1.0, ..settings(5) };
    assert!(matches!(c.configure(bad), Err(ConfigError::InvalidDuration { .. })));
    let bad = CounterSettings { capacity_clear_ratio: 1.0, ..settings(5) };
    assert!(matches!(c.configure(bad), Err(ConfigError::InvalidRatios { .. })));
    let bad = CounterSettings { notification_cooldown_secs: 1e20, ..settings(5) };
    assert!(matches!(c.configure(bad), Err(ConfigError::InvalidDuration { .. })));

    assert_eq!(c.settings(), &settings(5));
    assert_eq!(c.snapshot().inside, 1);
}

#[test]
fn test_configure_applies_new_cooldown_and_capacity() {
    let mut c = create_test_counter(settings(5));
    c.entry(0.0);

    c.configure(CounterSettings { max_capacity: 1, cooldown_secs: 0.1, ..settings(1) })
        .expect("valid settings");

    assert_eq!(c.snapshot().max_capacity, 1);
    let event = c.entry(0.1).expect("shorter cooldown applies");
    assert_eq!(event.outcome, EventOutcome::Denied);
}

#[test]
fn test_lowering_capacity_below_occupancy_blocks_entries() {
    let mut c = create_test_counter(settings(10));
    for i in 0..4 {
        c.entry(i as f64 * 2.0);
    }

    let snapshot = c.set_max_capacity(3).expect("non-zero capacity");
    assert_eq!(snapshot.inside, 4);
    assert!(snapshot.ratio > 1.0);
    // No alert until the next event or tick re-evaluates the ratio
    assert!(!c.policy.state().capacity_alert_active);

    let denied = c.entry(8.0).expect("debounce passed");
    assert_eq!(denied.outcome, EventOutcome::Denied);
    assert_eq!(denied.alerts, vec![AlertKind::CapacityAlert]);
    let now = c.at(9.0);
    assert_eq!(c.tick(now), None);

    assert_eq!(c.set_max_capacity(0), Err(ConfigError::ZeroCapacity));
}

#[test]
fn test_stray_exits_never_underflow() {
    let mut c = create_test_counter(settings(5));
    c.exit(0.0);
    c.exit(2.0);
    let event = c.entry(2.0).expect("entry accepted");

    assert_eq!(event.snapshot.inside, 0);
    assert_inside_invariant(&event.snapshot);
}

#[test]
fn test_alerts_reach_dispatcher_queue() {
    let mut c = create_test_counter(settings(1));
    c.entry(0.0);
    c.exit(2.0);

    let summary = c.metrics.report();
    assert_eq!(summary.alerts_enqueued, 2);
    assert_eq!(summary.entries_admitted, 1);
    assert_eq!(summary.exits_total, 1);
    assert_eq!(summary.inside, 0);
}

#[tokio::test]
async fn test_run_loop_handles_samples_and_commands() {
    let config = Config::default().with_counter_settings(settings(5));
    let metrics = Arc::new(Metrics::new());
    let mut counter = PeopleCounter::new(&config, metrics, None).expect("valid config");
    let mut snapshots = counter.subscribe();

    let (sample_tx, sample_rx) = mpsc::channel(16);
    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = CounterHandle::new(cmd_tx);

    let task = tokio::spawn(async move {
        counter.run(sample_rx, cmd_rx, shutdown_rx).await;
        counter
    });

    let now = Instant::now();
    sample_tx.send(SensorSample::new(SensorId::Entry, 40.0, now)).await.unwrap();
    snapshots.wait_for(|s| s.inside == 1).await.unwrap();

    assert_eq!(handle.settings().await.unwrap(), settings(5));
    assert_eq!(handle.set_max_capacity(0).await, Err(CommandError::Config(ConfigError::ZeroCapacity)));
    assert_eq!(handle.set_max_capacity(8).await.unwrap().max_capacity, 8);
    assert_eq!(handle.settings().await.unwrap().max_capacity, 8);
    let widened = CounterSettings { cooldown_secs: 0.5, ..settings(8) };
    handle.configure(widened).await.unwrap();
    assert_eq!(handle.settings().await.unwrap(), widened);
    assert_eq!(handle.reset().await.unwrap().entries, 0);

    shutdown_tx.send(true).unwrap();
    let counter = task.await.unwrap();
    assert_eq!(counter.snapshot().max_capacity, 8);
    assert_eq!(handle.settings().await, Err(CommandError::Unavailable));
}
