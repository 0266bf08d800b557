//! Occupancy counter - the single owner of entries/exits/inside
//!
//! Key behaviors:
//! - Capacity is enforced when the entry is decided, never clamped afterwards
//! - Exits are always recorded; `inside` floors at zero for stray exits
//! - `inside` is always derived as `max(0, entries - exits)`

use crate::domain::types::{OccupancySnapshot, OccupancyStatus};
use crate::infra::config::ConfigError;
use thiserror::Error;

/// Default ratio at which the room is reported as near capacity
pub const DEFAULT_NEAR_CAPACITY_RATIO: f64 = 0.8;

/// Errors from occupancy counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CounterError {
    /// Entry attempted while the room is full
    #[error("capacity exceeded: {inside}/{max_capacity} inside")]
    CapacityExceeded { inside: u32, max_capacity: u32 },
}

/// Raw occupancy counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyState {
    pub entries: u64,
    pub exits: u64,
    pub max_capacity: u32,
}

impl OccupancyState {
    /// People inside, floored at zero
    #[inline]
    pub fn inside(&self) -> u32 {
        u32::try_from(self.entries.saturating_sub(self.exits)).unwrap_or(u32::MAX)
    }
}

/// Occupancy counter with entry blocking at capacity
#[derive(Debug, Clone)]
pub struct OccupancyCounter {
    state: OccupancyState,
    near_capacity_ratio: f64,
}

impl OccupancyCounter {
    pub fn new(max_capacity: u32) -> Result<Self, ConfigError> {
        if max_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            state: OccupancyState { entries: 0, exits: 0, max_capacity },
            near_capacity_ratio: DEFAULT_NEAR_CAPACITY_RATIO,
        })
    }

    /// Override the near-capacity display threshold
    pub fn with_near_capacity_ratio(mut self, ratio: f64) -> Self {
        self.near_capacity_ratio = ratio;
        self
    }

    /// Admit one person, unless the room is full
    pub fn accept_entry(&mut self) -> Result<OccupancySnapshot, CounterError> {
        let inside = self.state.inside();
        if inside >= self.state.max_capacity {
            return Err(CounterError::CapacityExceeded {
                inside,
                max_capacity: self.state.max_capacity,
            });
        }
        self.state.entries += 1;
        Ok(self.snapshot())
    }

    /// Record one exit. Never blocked.
    pub fn accept_exit(&mut self) -> OccupancySnapshot {
        self.state.exits += 1;
        self.snapshot()
    }

    /// Change the capacity. Lowering it below the current occupancy is
    /// allowed; entries stay blocked until enough people have left.
    pub fn set_max_capacity(&mut self, max_capacity: u32) -> Result<(), ConfigError> {
        if max_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        self.state.max_capacity = max_capacity;
        Ok(())
    }

    /// Zero all counts, keeping the capacity
    pub fn reset(&mut self) {
        self.state.entries = 0;
        self.state.exits = 0;
    }

    pub fn snapshot(&self) -> OccupancySnapshot {
        let inside = self.state.inside();
        let max_capacity = self.state.max_capacity;
        let ratio = inside as f64 / max_capacity as f64;

        let status = if inside >= max_capacity {
            OccupancyStatus::Occupied
        } else if ratio >= self.near_capacity_ratio {
            OccupancyStatus::NearCapacity
        } else {
            OccupancyStatus::Normal
        };

        OccupancySnapshot {
            entries: self.state.entries,
            exits: self.state.exits,
            inside,
            max_capacity,
            ratio,
            status,
        }
    }
}
