//! Per-sensor trigger debouncing
//!
//! Single-beam ranging sensors fire repeatedly while a person stays in the
//! beam. Each sensor keeps its own cooldown clock; a trigger is accepted only
//! when the previous accepted trigger on the same sensor is at least
//! `cooldown` old.

use crate::domain::types::SensorId;
use std::time::{Duration, Instant};
use tracing::trace;

/// Cooldown clock for a single sensor
#[derive(Debug, Clone)]
pub struct DebounceState {
    last_accepted: Option<Instant>,
    cooldown: Duration,
}

impl DebounceState {
    pub fn new(cooldown: Duration) -> Self {
        Self { last_accepted: None, cooldown }
    }

    /// Accept the trigger if it is outside the cooldown window.
    ///
    /// Timestamps earlier than the last accepted trigger (clock jitter,
    /// reordered samples) are rejected.
    pub fn accept(&mut self, timestamp: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            let Some(gap) = timestamp.checked_duration_since(last) else {
                return false;
            };
            if gap < self.cooldown {
                return false;
            }
        }
        self.last_accepted = Some(timestamp);
        true
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    fn reset(&mut self) {
        self.last_accepted = None;
    }
}

/// Debounce filter over both sensors
#[derive(Debug, Clone)]
pub struct DebounceFilter {
    entry: DebounceState,
    exit: DebounceState,
}

impl DebounceFilter {
    pub fn new(cooldown: Duration) -> Self {
        Self { entry: DebounceState::new(cooldown), exit: DebounceState::new(cooldown) }
    }

    /// Returns true if the trigger on `sensor_id` is accepted
    pub fn accept(&mut self, sensor_id: SensorId, timestamp: Instant) -> bool {
        let accepted = self.state_mut(sensor_id).accept(timestamp);
        if !accepted {
            trace!(sensor = %sensor_id, "trigger_debounced");
        }
        accepted
    }

    pub fn state(&self, sensor_id: SensorId) -> &DebounceState {
        match sensor_id {
            SensorId::Entry => &self.entry,
            SensorId::Exit => &self.exit,
        }
    }

    /// Change the cooldown for both sensors; accepted history is kept
    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.entry.set_cooldown(cooldown);
        self.exit.set_cooldown(cooldown);
    }

    /// Forget accepted history on both sensors
    pub fn reset(&mut self) {
        self.entry.reset();
        self.exit.reset();
    }

    fn state_mut(&mut self, sensor_id: SensorId) -> &mut DebounceState {
        match sensor_id {
            SensorId::Entry => &mut self.entry,
            SensorId::Exit => &mut self.exit,
        }
    }
}
