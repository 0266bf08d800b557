//! Mass event (burst) detection over a sliding time window
//!
//! Every debounced trigger, entry or exit, is fed in. The window is evicted
//! and re-counted on every call; there is no running counter to drift.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding window of recent event timestamps
#[derive(Debug, Clone)]
pub struct MassEventDetector {
    window: VecDeque<Instant>,
    window_duration: Duration,
    threshold: usize,
}

impl MassEventDetector {
    pub fn new(threshold: usize, window_duration: Duration) -> Self {
        Self { window: VecDeque::new(), window_duration, threshold }
    }

    /// Record an event and report whether the window holds a burst.
    ///
    /// Timestamps strictly older than `window_duration` relative to
    /// `timestamp` are evicted first.
    pub fn observe(&mut self, timestamp: Instant) -> bool {
        // Keep the deque ordered even if a caller hands us an older stamp
        let pos = self.window.partition_point(|&t| t <= timestamp);
        self.window.insert(pos, timestamp);
        self.evict(timestamp);
        self.window.len() >= self.threshold
    }

    /// Number of events inside the window as of the last call
    pub fn count(&self) -> usize {
        self.window.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }

    /// Change burst parameters; current window contents are kept
    pub fn reconfigure(&mut self, threshold: usize, window_duration: Duration) {
        self.threshold = threshold;
        self.window_duration = window_duration;
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.window.front() {
            match now.checked_duration_since(oldest) {
                Some(age) if age > self.window_duration => {
                    self.window.pop_front();
                }
                _ => break,
            }
        }
    }
}
