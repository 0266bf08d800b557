//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps periodic counters to get a snapshot;
/// `scrape()` reads the lifetime values and resets nothing.
pub struct Metrics {
    /// Raw samples received from the sensing layer (monotonic)
    samples_total: AtomicU64,
    /// Samples inside the trigger distance (monotonic)
    triggers_total: AtomicU64,
    /// Triggers rejected by the debounce filter (monotonic)
    debounced_total: AtomicU64,
    /// Samples dropped because the sample channel was full (monotonic)
    samples_dropped: AtomicU64,
    /// Entries counted (monotonic)
    entries_admitted: AtomicU64,
    /// Entries rejected at capacity (monotonic)
    entries_denied: AtomicU64,
    /// Exits counted (monotonic)
    exits_total: AtomicU64,
    /// Mass events detected (monotonic)
    bursts_total: AtomicU64,
    /// Alerts handed to the dispatcher queue (monotonic)
    alerts_enqueued: AtomicU64,
    /// Alerts dropped because the dispatcher queue was full (monotonic)
    alerts_dropped: AtomicU64,
    /// Successful notifier deliveries (monotonic)
    notifications_sent: AtomicU64,
    /// Notifier deliveries that failed after all attempts (monotonic)
    notifications_failed: AtomicU64,
    /// Retry attempts made by the dispatcher (monotonic)
    notification_retries: AtomicU64,
    /// Triggers processed since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of processing latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max processing latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Lifetime latency histogram and sum for scrapes (never reset)
    latency_total_buckets: [AtomicU64; NUM_BUCKETS],
    latency_total_sum_us: AtomicU64,
    /// Current occupancy gauges (updated by the counter)
    inside: AtomicU64,
    max_capacity: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_total: AtomicU64::new(0),
            triggers_total: AtomicU64::new(0),
            debounced_total: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
            entries_admitted: AtomicU64::new(0),
            entries_denied: AtomicU64::new(0),
            exits_total: AtomicU64::new(0),
            bursts_total: AtomicU64::new(0),
            alerts_enqueued: AtomicU64::new(0),
            alerts_dropped: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            notification_retries: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_total_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_total_sum_us: AtomicU64::new(0),
            inside: AtomicU64::new(0),
            max_capacity: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a raw sample, and whether it fell inside the trigger zone
    #[inline]
    pub fn record_sample(&self, triggered: bool) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        if triggered {
            self.triggers_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_debounced(&self) {
        self.debounced_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sample_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_entry(&self, admitted: bool) {
        if admitted {
            self.entries_admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.entries_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_exit(&self) {
        self.exits_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_burst(&self) {
        self.bursts_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_enqueued(&self) {
        self.alerts_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_dropped(&self) {
        self.alerts_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the final outcome of one notifier delivery
    #[inline]
    pub fn record_notification(&self, delivered: bool) {
        if delivered {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.notifications_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_notification_retry(&self) {
        self.notification_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a debounced trigger was processed with given latency (lock-free)
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_total_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_total_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    /// Publish the current occupancy gauges
    #[inline]
    pub fn set_occupancy(&self, inside: u32, max_capacity: u32) {
        self.inside.store(inside as u64, Ordering::Relaxed);
        self.max_capacity.store(max_capacity as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn samples_total(&self) -> u64 {
        self.samples_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn alerts_dropped(&self) -> u64 {
        self.alerts_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn notifications_failed(&self) -> u64 {
        self.notifications_failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn notification_retries(&self) -> u64 {
        self.notification_retries.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if events_count > 0 { latency_sum / events_count } else { 0 };

        self.summarize(events_per_sec, avg_latency, max_latency, latency_sum, lat_buckets)
    }

    /// Lifetime view for Prometheus scrapes
    ///
    /// Counters are the same as in `report()`, but the latency fields cover
    /// the whole process lifetime and nothing is reset, so scrapes and the
    /// periodic log never take each other's samples. `events_per_sec` and
    /// `max_process_latency_us` are not tracked over the lifetime and are 0.
    pub fn scrape(&self) -> MetricsSummary {
        let lat_buckets = load_buckets(&self.latency_total_buckets);
        let latency_sum = self.latency_total_sum_us.load(Ordering::Relaxed);
        let count: u64 = lat_buckets.iter().sum();
        let avg_latency = if count > 0 { latency_sum / count } else { 0 };

        self.summarize(0.0, avg_latency, 0, latency_sum, lat_buckets)
    }

    fn summarize(
        &self,
        events_per_sec: f64,
        avg_latency: u64,
        max_latency: u64,
        latency_sum: u64,
        lat_buckets: [u64; NUM_BUCKETS],
    ) -> MetricsSummary {
        MetricsSummary {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            triggers_total: self.triggers_total.load(Ordering::Relaxed),
            debounced_total: self.debounced_total.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            entries_admitted: self.entries_admitted.load(Ordering::Relaxed),
            entries_denied: self.entries_denied.load(Ordering::Relaxed),
            exits_total: self.exits_total.load(Ordering::Relaxed),
            bursts_total: self.bursts_total.load(Ordering::Relaxed),
            alerts_enqueued: self.alerts_enqueued.load(Ordering::Relaxed),
            alerts_dropped: self.alerts_dropped.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            notification_retries: self.notification_retries.load(Ordering::Relaxed),
            events_per_sec,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_sum_us: latency_sum,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            inside: self.inside.load(Ordering::Relaxed),
            max_capacity: self.max_capacity.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics summary
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub samples_total: u64,
    pub triggers_total: u64,
    pub debounced_total: u64,
    pub samples_dropped: u64,
    pub entries_admitted: u64,
    pub entries_denied: u64,
    pub exits_total: u64,
    pub bursts_total: u64,
    pub alerts_enqueued: u64,
    pub alerts_dropped: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub notification_retries: u64,
    pub events_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    pub lat_sum_us: u64,
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub inside: u64,
    pub max_capacity: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            samples = %self.samples_total,
            triggers = %self.triggers_total,
            debounced = %self.debounced_total,
            admitted = %self.entries_admitted,
            denied = %self.entries_denied,
            exits = %self.exits_total,
            bursts = %self.bursts_total,
            notify_ok = %self.notifications_sent,
            notify_failed = %self.notifications_failed,
            events_per_sec = format!("{:.2}", self.events_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.samples_total(), 0);
        assert_eq!(metrics.notifications_sent(), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(60000), 10);
    }

    #[test]
    fn test_record_samples_and_entries() {
        let metrics = Metrics::new();
        metrics.record_sample(true);
        metrics.record_sample(false);
        metrics.record_entry(true);
        metrics.record_entry(false);
        metrics.record_exit();

        let summary = metrics.report();
        assert_eq!(summary.samples_total, 2);
        assert_eq!(summary.triggers_total, 1);
        assert_eq!(summary.entries_admitted, 1);
        assert_eq!(summary.entries_denied, 1);
        assert_eq!(summary.exits_total, 1);
    }

    #[test]
    fn test_report_resets_periodic_counters_only() {
        let metrics = Metrics::new();
        metrics.record_event_processed(150);
        metrics.record_event_processed(250);
        metrics.record_notification(true);

        let first = metrics.report();
        assert_eq!(first.avg_process_latency_us, 200);
        assert_eq!(first.max_process_latency_us, 250);
        assert_eq!(first.lat_buckets.iter().sum::<u64>(), 2);

        let second = metrics.report();
        assert_eq!(second.avg_process_latency_us, 0);
        assert_eq!(second.lat_buckets.iter().sum::<u64>(), 0);
        assert_eq!(second.notifications_sent, 1);
    }

    #[test]
    fn test_scrape_does_not_consume_report_window() {
        let metrics = Metrics::new();
        metrics.record_event_processed(150);
        metrics.record_event_processed(250);

        let scraped = metrics.scrape();
        assert_eq!(scraped.lat_buckets.iter().sum::<u64>(), 2);
        assert_eq!(scraped.lat_sum_us, 400);

        let report = metrics.report();
        assert_eq!(report.lat_buckets.iter().sum::<u64>(), 2);
        assert_eq!(report.avg_process_latency_us, 200);

        // The lifetime histogram survives the report reset
        metrics.record_event_processed(50);
        let scraped = metrics.scrape();
        assert_eq!(scraped.lat_buckets.iter().sum::<u64>(), 3);
        assert_eq!(scraped.lat_sum_us, 450);
        assert_eq!(metrics.report().lat_buckets.iter().sum::<u64>(), 1);
    }

    #[test]
    fn test_percentiles() {
        let mut buckets = [0u64; NUM_BUCKETS];
        buckets[0] = 90;
        buckets[5] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.50), 100);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 3200);
        assert_eq!(percentile_from_buckets(&[0; NUM_BUCKETS], 0.5), 0);
    }

    #[test]
    fn test_occupancy_gauges() {
        let metrics = Metrics::new();
        metrics.set_occupancy(4, 5);
        let summary = metrics.report();
        assert_eq!(summary.inside, 4);
        assert_eq!(summary.max_capacity, 5);
    }
}
