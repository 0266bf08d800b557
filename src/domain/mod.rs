//! Domain models - core value types
//!
//! This module contains the canonical data types used throughout the system:
//! - `SensorSample` - raw distance reading from the entry or exit sensor
//! - `ObservedEvent` - a debounced trigger and what the counter did with it
//! - `OccupancySnapshot` - read-only view of the counters
//! - `AlertEvent` - alert transition handed to the notification dispatcher

pub mod alert;
pub mod types;

// Re-export commonly used types at module level
pub use alert::{AlertEvent, AlertKind};
pub use types::{EventOutcome, ObservedEvent, OccupancySnapshot, OccupancyStatus, SensorId, SensorSample};
