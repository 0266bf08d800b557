//! Notification dispatcher - delivers alerts off the sampling path
//!
//! The counter enqueues alerts with `try_send` and never waits. One worker
//! drains the queue and fans each alert out to every configured notifier,
//! with a timeout per attempt and bounded exponential backoff between
//! attempts. Delivery failures are logged and counted, never reported back.

use crate::domain::alert::AlertEvent;
use crate::infra::metrics::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Delivery failure reported by a notifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by remote with status {status}")]
    Rejected { status: u16 },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("notifier not configured: {0}")]
    Disabled(&'static str),
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name for logs
    fn name(&self) -> &'static str;

    /// Deliver one alert
    async fn notify(&self, alert: &AlertEvent) -> Result<(), DispatchError>;
}

/// Notifier that only writes the alert to the log. Never fails.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, alert: &AlertEvent) -> Result<(), DispatchError> {
        warn!(
            alert_id = %alert.id,
            kind = %alert.kind.as_str(),
            inside = %alert.snapshot.inside,
            max_capacity = %alert.snapshot.max_capacity,
            summary = %alert.summary(),
            "alert"
        );
        Ok(())
    }
}

/// Attempt limits for one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure
    pub backoff: Duration,
    /// Upper bound for a single attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff to wait after failed attempt number `attempt` (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exp)
    }
}

/// Deliver `alert` through `notifier`, retrying per `policy`
pub async fn deliver(
    notifier: &dyn Notifier,
    alert: &AlertEvent,
    policy: RetryPolicy,
    metrics: &Metrics,
) -> Result<u32, DispatchError> {
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.timeout, notifier.notify(alert)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(policy.timeout)),
        };

        match result {
            Ok(()) => return Ok(attempt),
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.backoff_after(attempt);
                warn!(
                    notifier = %notifier.name(),
                    alert_id = %alert.id,
                    attempt = %attempt,
                    retry_in_ms = %delay.as_millis(),
                    error = %e,
                    "notification_retry"
                );
                metrics.record_notification_retry();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Cloneable handle used by the counter to enqueue alerts
#[derive(Clone)]
pub struct AlertSender {
    tx: mpsc::Sender<(Instant, AlertEvent)>,
    metrics: Arc<Metrics>,
}

impl AlertSender {
    /// Enqueue without waiting. Returns false if the alert was dropped.
    pub fn send(&self, alert: AlertEvent) -> bool {
        match self.tx.try_send((Instant::now(), alert)) {
            Ok(()) => {
                self.metrics.record_alert_enqueued();
                true
            }
            Err(TrySendError::Full((_, alert))) => {
                self.metrics.record_alert_dropped();
                warn!(alert_id = %alert.id, kind = %alert.kind.as_str(), "alert_dropped_queue_full");
                false
            }
            Err(TrySendError::Closed((_, alert))) => {
                self.metrics.record_alert_dropped();
                error!(alert_id = %alert.id, kind = %alert.kind.as_str(), "alert_dropped_dispatcher_gone");
                false
            }
        }
    }
}

/// Worker that delivers queued alerts to every notifier
pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    rx: mpsc::Receiver<(Instant, AlertEvent)>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl NotificationDispatcher {
    /// Run the worker until every sender is dropped
    pub async fn run(mut self) {
        let names: Vec<&str> = self.notifiers.iter().map(|n| n.name()).collect();
        info!(notifiers = ?names, max_attempts = %self.policy.max_attempts, "dispatcher_started");

        while let Some((enqueued_at, alert)) = self.rx.recv().await {
            let queue_delay_ms = enqueued_at.elapsed().as_millis() as u64;
            debug!(alert_id = %alert.id, queue_delay_ms = %queue_delay_ms, "alert_dequeued");
            self.dispatch(alert).await;
        }

        info!("dispatcher_stopped");
    }

    /// Deliver one alert to all notifiers concurrently, waiting for all of
    /// them so that per-channel ordering is preserved across alerts
    async fn dispatch(&self, alert: AlertEvent) {
        let alert = Arc::new(alert);
        let mut deliveries = JoinSet::new();

        for notifier in &self.notifiers {
            let notifier = notifier.clone();
            let alert = alert.clone();
            let metrics = self.metrics.clone();
            let policy = self.policy;
            deliveries.spawn(async move {
                let start = Instant::now();
                let result = deliver(notifier.as_ref(), &alert, policy, &metrics).await;
                let latency_ms = start.elapsed().as_millis() as u64;
                match result {
                    Ok(attempts) => {
                        metrics.record_notification(true);
                        info!(
                            notifier = %notifier.name(),
                            alert_id = %alert.id,
                            kind = %alert.kind.as_str(),
                            attempts = %attempts,
                            latency_ms = %latency_ms,
                            "notification_sent"
                        );
                    }
                    Err(e) => {
                        metrics.record_notification(false);
                        error!(
                            notifier = %notifier.name(),
                            alert_id = %alert.id,
                            kind = %alert.kind.as_str(),
                            latency_ms = %latency_ms,
                            error = %e,
                            "notification_failed"
                        );
                    }
                }
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "notification_task_panicked");
            }
        }
    }
}

/// Create an alert queue and its worker
///
/// Returns the sender (for the counter) and the worker (to be spawned)
pub fn create_dispatcher(
    notifiers: Vec<Arc<dyn Notifier>>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
    queue_size: usize,
) -> (AlertSender, NotificationDispatcher) {
    let (tx, rx) = mpsc::channel(queue_size.max(1));
    let sender = AlertSender { tx, metrics: metrics.clone() };
    let worker = NotificationDispatcher { notifiers, rx, policy, metrics };
    (sender, worker)
}
