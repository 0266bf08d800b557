//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `debounce` - Per-sensor trigger cooldown
//! - `occupancy` - Entry/exit counting with capacity blocking
//! - `mass_event` - Sliding-window burst detection
//! - `alert_policy` - Capacity hysteresis and notification cooldown
//! - `counter` - Pipeline owner and run loop
//! - `dispatcher` - Async notification worker

pub mod alert_policy;
pub mod counter;
pub mod debounce;
pub mod dispatcher;
pub mod mass_event;
pub mod occupancy;

// Re-export commonly used types
pub use counter::{CounterCommand, CounterHandle, PeopleCounter};
pub use dispatcher::{create_dispatcher, AlertSender, LogNotifier, Notifier, RetryPolicy};
