//! Telegram bot notifier
//!
//! Sends HTML-formatted messages through the Bot API `sendMessage` method.
//! Capacity-cleared messages are sent silently.

use crate::domain::alert::{AlertEvent, AlertKind};
use crate::io::http_outcome;
use crate::services::dispatcher::{DispatchError, Notifier};
use async_trait::async_trait;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: reqwest::Client,
    /// Full sendMessage URL; contains the bot token, never logged
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{API_BASE}/bot{bot_token}/sendMessage"),
            chat_id: chat_id.to_string(),
        })
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Render the message body for an alert
pub fn format_message(alert: &AlertEvent) -> String {
    let s = &alert.snapshot;
    let site = escape_html(&alert.site);
    let time = alert.raised_at.format("%Y-%m-%d %H:%M:%S UTC");

    match alert.kind {
        AlertKind::CapacityAlert => format!(
            "🚨 <b>ROOM AT MAXIMUM CAPACITY!</b> ({site})\n\n\
             👥 Currently Inside: <b>{}/{}</b>\n\
             🚪 Total Entries: {}\n\
             🚶 Total Exits: {}\n\
             📊 Capacity: <b>{:.0}%</b>\n\n\
             ⏰ Time: {time}",
            s.inside,
            s.max_capacity,
            s.entries,
            s.exits,
            s.percent()
        ),
        AlertKind::CapacityCleared => format!(
            "✅ <b>Room Capacity Back to Normal</b> ({site})\n\n\
             👥 Currently Inside: <b>{}/{}</b>\n\
             📊 Capacity: <b>{:.0}%</b>\n\n\
             ⏰ Time: {time}",
            s.inside,
            s.max_capacity,
            s.percent()
        ),
        AlertKind::MassEvent => format!(
            "⚠️ <b>MASS EVENT DETECTED</b> ({site})\n\n\
             🏃 Movements: <b>{}</b> in {:.1}s\n\
             👥 Currently Inside: <b>{}/{}</b>\n\n\
             ⏰ Time: {time}",
            alert.burst_count.unwrap_or(0),
            alert.burst_window_secs.unwrap_or(0.0),
            s.inside,
            s.max_capacity
        ),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn notify(&self, alert: &AlertEvent) -> Result<(), DispatchError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": format_message(alert),
            "parse_mode": "HTML",
            "disable_notification": alert.kind.is_silent(),
        });

        http_outcome(self.client.post(&self.endpoint).json(&body).send().await)
    }
}
