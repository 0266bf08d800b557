//! Shared types for the occupancy counter

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One of the two one-directional ranging sensors at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorId {
    Entry,
    Exit,
}

impl SensorId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorId::Entry => "entry",
            SensorId::Exit => "exit",
        }
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SensorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" | "in" => Ok(SensorId::Entry),
            "exit" | "out" => Ok(SensorId::Exit),
            other => Err(format!("unknown sensor '{other}'")),
        }
    }
}

/// Raw distance reading from a sensor, stamped with monotonic receive time
#[derive(Debug, Clone, Copy)]
pub struct SensorSample {
    pub sensor_id: SensorId,
    pub distance_cm: f64,
    pub timestamp: Instant,
}

impl SensorSample {
    #[inline]
    pub fn new(sensor_id: SensorId, distance_cm: f64, timestamp: Instant) -> Self {
        Self { sensor_id, distance_cm, timestamp }
    }
}

/// Coarse occupancy level shown alongside the raw counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyStatus {
    Normal,
    NearCapacity,
    Occupied,
}

impl OccupancyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyStatus::Normal => "normal",
            OccupancyStatus::NearCapacity => "near_capacity",
            OccupancyStatus::Occupied => "occupied",
        }
    }
}

/// Immutable view of the occupancy counters handed to readers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OccupancySnapshot {
    pub entries: u64,
    pub exits: u64,
    pub inside: u32,
    pub max_capacity: u32,
    /// `inside / max_capacity`
    pub ratio: f64,
    pub status: OccupancyStatus,
}

impl OccupancySnapshot {
    /// Occupancy as a whole percentage, for display
    pub fn percent(&self) -> f64 {
        self.ratio * 100.0
    }

    pub fn is_full(&self) -> bool {
        self.inside >= self.max_capacity
    }
}

/// What the counter did with a debounced trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// Entry counted
    Admitted,
    /// Entry rejected because the room was full
    Denied,
    /// Exit counted
    Exited,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Admitted => "admitted",
            EventOutcome::Denied => "denied",
            EventOutcome::Exited => "exited",
        }
    }
}

/// Trigger that passed the debounce filter, with everything it caused
#[derive(Debug, Clone)]
pub struct ObservedEvent {
    pub sensor_id: SensorId,
    pub distance_cm: f64,
    pub timestamp: Instant,
    pub outcome: EventOutcome,
    pub snapshot: OccupancySnapshot,
    /// Number of events currently inside the burst window
    pub burst_count: usize,
    /// Alerts raised while processing this event
    pub alerts: Vec<crate::domain::alert::AlertKind>,
}
