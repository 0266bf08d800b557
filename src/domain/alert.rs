//! Alert model - what the policy engine raises and notifiers deliver

use crate::domain::types::OccupancySnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Kind of alert transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Occupancy reached the set threshold
    CapacityAlert,
    /// Occupancy dropped below the clear threshold
    CapacityCleared,
    /// Burst of movement detected in the sliding window
    MassEvent,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::CapacityAlert => "capacity_alert",
            AlertKind::CapacityCleared => "capacity_cleared",
            AlertKind::MassEvent => "mass_event",
        }
    }

    /// Clear notifications are informational and delivered silently
    pub fn is_silent(&self) -> bool {
        matches!(self, AlertKind::CapacityCleared)
    }
}

/// Alert with the context notifiers need to render it
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub kind: AlertKind,
    pub site: String,
    pub snapshot: OccupancySnapshot,
    /// Events in the burst window (mass events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_count: Option<usize>,
    /// Burst window length in seconds (mass events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_window_secs: Option<f64>,
    pub raised_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, site: &str, snapshot: OccupancySnapshot) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            site: site.to_string(),
            snapshot,
            burst_count: None,
            burst_window_secs: None,
            raised_at: Utc::now(),
        }
    }

    /// Attach burst window details
    pub fn with_burst(mut self, count: usize, window_secs: f64) -> Self {
        self.burst_count = Some(count);
        self.burst_window_secs = Some(window_secs);
        self
    }

    /// One-line plain text summary, used by the log notifier and webhooks
    pub fn summary(&self) -> String {
        match self.kind {
            AlertKind::CapacityAlert => format!(
                "{}: room at maximum capacity ({}/{})",
                self.site, self.snapshot.inside, self.snapshot.max_capacity
            ),
            AlertKind::CapacityCleared => format!(
                "{}: capacity back to normal ({}/{})",
                self.site, self.snapshot.inside, self.snapshot.max_capacity
            ),
            AlertKind::MassEvent => format!(
                "{}: mass event, {} movements in {:.1}s ({}/{} inside)",
                self.site,
                self.burst_count.unwrap_or(0),
                self.burst_window_secs.unwrap_or(0.0),
                self.snapshot.inside,
                self.snapshot.max_capacity
            ),
        }
    }
}
