//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `sample_source` - Line protocol parser and stdin source
//! - `serial` - Serial port source for the sensing node
//! - `telegram` - Telegram bot notifier
//! - `webhook` - JSON webhook notifier
//! - `mqtt_alerts` - MQTT alert publisher
//! - `status_server` - Metrics, snapshot and admin HTTP endpoint

pub mod mqtt_alerts;
pub mod sample_source;
pub mod serial;
pub mod status_server;
pub mod telegram;
pub mod webhook;

use crate::services::dispatcher::DispatchError;

// Re-export commonly used types
pub use mqtt_alerts::MqttNotifier;
pub use sample_source::{parse_sample_line, StdinSource};
pub use serial::SerialSource;
pub use status_server::{start_status_server, StatusState};
pub use telegram::TelegramNotifier;
pub use webhook::WebhookNotifier;

/// Map an HTTP send result to a delivery outcome. Non-2xx is a rejection.
pub(crate) fn http_outcome(
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<(), DispatchError> {
    let response = result.map_err(|e| DispatchError::Transport(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(DispatchError::Rejected { status: status.as_u16() })
    }
}
