//! Serial sample source
//!
//! Reads the line protocol from the sensing node's USB serial port. The port
//! is reopened after read errors or disconnects with a fixed delay.

use crate::domain::types::SensorSample;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::sample_source::{forward_lines, StreamEnd};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialPortBuilderExt;
use tracing::{error, info, warn};

pub struct SerialSource {
    device: String,
    baud: u32,
    reconnect_delay: Duration,
    tx: mpsc::Sender<SensorSample>,
    metrics: Arc<Metrics>,
}

impl SerialSource {
    pub fn new(config: &Config, tx: mpsc::Sender<SensorSample>, metrics: Arc<Metrics>) -> Self {
        Self {
            device: config.source_device().to_string(),
            baud: config.source_baud(),
            reconnect_delay: config.source_reconnect_delay(),
            tx,
            metrics,
        }
    }

    /// Read until shutdown, reopening the port as needed
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            device = %self.device,
            baud = %self.baud,
            reconnect_delay_ms = %self.reconnect_delay.as_millis(),
            "serial_source_started"
        );

        loop {
            match tokio_serial::new(&self.device, self.baud).open_native_async() {
                Ok(port) => {
                    info!(device = %self.device, "serial_port_opened");
                    let reader = BufReader::new(port);
                    match forward_lines(reader, "serial", &self.tx, &self.metrics, &mut shutdown)
                        .await
                    {
                        Ok(StreamEnd::Shutdown) => {
                            info!("serial_source_shutdown");
                            return;
                        }
                        Ok(StreamEnd::ReceiverClosed) => {
                            info!("serial_source_receiver_closed");
                            return;
                        }
                        Ok(StreamEnd::Eof) => {
                            warn!(device = %self.device, "serial_port_closed");
                        }
                        Err(e) => {
                            warn!(device = %self.device, error = %e, "serial_read_error");
                        }
                    }
                }
                Err(e) => {
                    error!(device = %self.device, error = %e, "serial_port_open_failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => {
                    info!("serial_source_shutdown");
                    return;
                }
            }
        }
    }
}
