//! Line protocol for sensor readings, and the stdin source
//!
//! One reading per line, in either form:
//! - `ENTRY 42.5` / `exit 80cm` (sensor name, distance in cm)
//! - `JSON:{"sensor":"entry","distance":42.5}`
//!
//! Readings are stamped with the monotonic receive time. Lines that do not
//! parse are skipped.

use crate::domain::types::{SensorId, SensorSample};
use crate::infra::metrics::Metrics;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const JSON_PREFIX: &str = "JSON:";

/// Why a line was not a reading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    #[error("empty line")]
    Empty,
    #[error("unrecognised line: {0}")]
    Unrecognised(String),
    #[error("invalid distance: {0}")]
    InvalidDistance(String),
    #[error("invalid json reading: {0}")]
    Json(String),
}

#[derive(Debug, Deserialize)]
struct JsonReading {
    sensor: String,
    distance: f64,
}

/// Parse one protocol line into `(sensor, distance_cm)`
pub fn parse_sample_line(line: &str) -> Result<(SensorId, f64), LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(LineError::Empty);
    }

    if let Some(json) = line.strip_prefix(JSON_PREFIX) {
        let reading: JsonReading =
            serde_json::from_str(json.trim()).map_err(|e| LineError::Json(e.to_string()))?;
        let sensor: SensorId = reading.sensor.parse().map_err(LineError::Json)?;
        return check_distance(sensor, reading.distance);
    }

    let mut parts = line.split_whitespace();
    let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(LineError::Unrecognised(line.to_string()));
    };
    let sensor: SensorId = name.parse().map_err(|_| LineError::Unrecognised(line.to_string()))?;

    let lower = value.to_ascii_lowercase();
    let number = lower.strip_suffix("cm").unwrap_or(&lower);
    let distance: f64 =
        number.parse().map_err(|_| LineError::InvalidDistance(value.to_string()))?;
    check_distance(sensor, distance)
}

fn check_distance(sensor: SensorId, distance: f64) -> Result<(SensorId, f64), LineError> {
    if distance.is_finite() {
        Ok((sensor, distance))
    } else {
        Err(LineError::InvalidDistance(distance.to_string()))
    }
}

/// How a line stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Eof,
    ReceiverClosed,
    Shutdown,
}

/// Read lines until EOF, shutdown, or the counter goes away, forwarding
/// every parsed reading. A full channel drops the reading.
pub async fn forward_lines<R>(
    reader: R,
    source: &str,
    tx: &mpsc::Sender<SensorSample>,
    metrics: &Metrics,
    shutdown: &mut watch::Receiver<bool>,
) -> std::io::Result<StreamEnd>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.changed() => return Ok(StreamEnd::Shutdown),
        };
        let Some(line) = line else {
            return Ok(StreamEnd::Eof);
        };

        let (sensor_id, distance_cm) = match parse_sample_line(&line) {
            Ok(reading) => reading,
            Err(LineError::Empty) => continue,
            Err(e) => {
                debug!(source = %source, error = %e, "sample_line_skipped");
                continue;
            }
        };

        let sample = SensorSample::new(sensor_id, distance_cm, Instant::now());
        match tx.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics.record_sample_dropped();
                warn!(source = %source, sensor = %sensor_id, "sample_dropped_channel_full");
            }
            Err(TrySendError::Closed(_)) => return Ok(StreamEnd::ReceiverClosed),
        }
    }
}

/// Reads the line protocol from standard input (simulated event injection)
pub struct StdinSource {
    tx: mpsc::Sender<SensorSample>,
    metrics: Arc<Metrics>,
}

impl StdinSource {
    pub fn new(tx: mpsc::Sender<SensorSample>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("stdin_source_started");
        let reader = BufReader::new(tokio::io::stdin());

        match forward_lines(reader, "stdin", &self.tx, &self.metrics, &mut shutdown).await {
            Ok(end) => info!(end = ?end, "stdin_source_stopped"),
            Err(e) => warn!(error = %e, "stdin_read_error"),
        }
    }
}
