//! HTTP status endpoint
//!
//! - `GET /metrics` - Prometheus text exposition
//! - `GET /snapshot` - current occupancy as JSON
//! - `GET /health` - liveness
//! - `GET /settings` - current counter settings as JSON
//! - `POST /reset` - system reset through the counter's command channel
//! - `POST /capacity` - `{"max_capacity": n}`
//! - `POST /configure` - partial settings as JSON; omitted fields are kept
//!
//! Admin requests go through the counter's command channel, so invalid
//! values are rejected by the counter's own validation (422).
//!
//! Uses hyper for the HTTP server.

use crate::domain::types::OccupancySnapshot;
use crate::infra::config::SettingsUpdate;
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::counter::{CommandError, CounterHandle};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Largest admin request body accepted
const MAX_BODY_BYTES: usize = 4096;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared state for request handlers
#[derive(Clone)]
pub struct StatusState {
    pub metrics: Arc<Metrics>,
    pub site_id: Arc<str>,
    pub snapshots: watch::Receiver<OccupancySnapshot>,
    pub counter: CounterHandle,
}

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

fn write_gauge_f64(output: &mut String, name: &str, help: &str, site: &str, val: f64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val:.6}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum_us: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum_us}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics and the current snapshot in Prometheus text format
fn format_prometheus_metrics(metrics: &Metrics, snapshot: &OccupancySnapshot, site: &str) -> String {
    let summary = metrics.scrape();
    let mut output = String::with_capacity(4096);

    write_pipeline_metrics(&mut output, site, &summary);
    write_alert_metrics(&mut output, site, &summary);
    write_histogram(
        &mut output,
        "occupancy_event_latency_us",
        "Trigger processing latency in microseconds",
        site,
        &summary.lat_buckets,
        summary.lat_sum_us,
    );

    write_metric(&mut output, "occupancy_inside", "People currently inside", MetricType::Gauge, site, snapshot.inside as u64);
    write_metric(
        &mut output,
        "occupancy_max_capacity",
        "Configured maximum capacity",
        MetricType::Gauge,
        site,
        snapshot.max_capacity as u64,
    );
    write_gauge_f64(&mut output, "occupancy_ratio", "Inside divided by capacity", site, snapshot.ratio);

    output
}

fn write_pipeline_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    let counters = [
        ("occupancy_samples_total", "Raw sensor samples received", summary.samples_total),
        ("occupancy_triggers_total", "Samples inside the trigger zone", summary.triggers_total),
        ("occupancy_debounced_total", "Triggers suppressed by debounce", summary.debounced_total),
        ("occupancy_samples_dropped_total", "Samples dropped on a full channel", summary.samples_dropped),
        ("occupancy_entries_total", "Entries admitted", summary.entries_admitted),
        ("occupancy_entries_denied_total", "Entries denied at capacity", summary.entries_denied),
        ("occupancy_exits_total", "Exits counted", summary.exits_total),
        ("occupancy_bursts_total", "Mass events detected", summary.bursts_total),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, site, val);
    }
}

fn write_alert_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    let counters = [
        ("occupancy_alerts_enqueued_total", "Alerts queued for dispatch", summary.alerts_enqueued),
        ("occupancy_alerts_dropped_total", "Alerts dropped on a full queue", summary.alerts_dropped),
        ("occupancy_notifications_sent_total", "Notifier deliveries that succeeded", summary.notifications_sent),
        ("occupancy_notifications_failed_total", "Notifier deliveries that failed", summary.notifications_failed),
        ("occupancy_notification_retries_total", "Notifier retry attempts", summary.notification_retries),
    ];
    for (name, help, val) in counters {
        write_metric(output, name, help, MetricType::Counter, site, val);
    }
}

fn response(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => response(status, "application/json", body),
        Err(e) => {
            error!(error = %e, "json_serialize_failed");
            response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "serialize error")
        }
    }
}

fn error_response(status: StatusCode, error: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "ok": false, "error": error }))
}

/// Map a failed admin command to a response
fn command_error_response(action: &str, e: CommandError) -> Response<Full<Bytes>> {
    warn!(action = %action, error = %e, "admin_command_failed");
    match e {
        CommandError::Unavailable => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "counter_unavailable")
        }
        CommandError::Config(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()),
    }
}

/// Read a size-limited JSON body
async fn read_json<T, B>(body: B) -> Result<T, Response<Full<Bytes>>>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            return Err(error_response(StatusCode::PAYLOAD_TOO_LARGE, "body_too_large"));
        }
        Err(e) => {
            warn!(error = %e, "admin_body_read_failed");
            return Err(error_response(StatusCode::BAD_REQUEST, "body_read_failed"));
        }
    };
    serde_json::from_slice(&bytes)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("invalid_json: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CapacityRequest {
    max_capacity: u32,
}

async fn set_capacity<B>(body: B, counter: &CounterHandle) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let request: CapacityRequest = match read_json(body).await {
        Ok(request) => request,
        Err(resp) => return resp,
    };
    match counter.set_max_capacity(request.max_capacity).await {
        Ok(snapshot) => {
            info!(max_capacity = %request.max_capacity, "manual_capacity_change");
            json_response(StatusCode::OK, &snapshot)
        }
        Err(e) => command_error_response("capacity", e),
    }
}

async fn configure<B>(body: B, counter: &CounterHandle) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let update: SettingsUpdate = match read_json(body).await {
        Ok(update) => update,
        Err(resp) => return resp,
    };
    let current = match counter.settings().await {
        Ok(settings) => settings,
        Err(e) => return command_error_response("configure", e),
    };
    let settings = update.apply_to(current);
    match counter.configure(settings).await {
        Ok(()) => {
            info!("manual_configure");
            json_response(StatusCode::OK, &settings)
        }
        Err(e) => command_error_response("configure", e),
    }
}

async fn handle_request<B>(
    req: Request<B>,
    state: StatusState,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let (parts, body) = req.into_parts();
    let resp = match (&parts.method, parts.uri.path()) {
        (&Method::GET, "/metrics") => {
            let snapshot = *state.snapshots.borrow();
            let body = format_prometheus_metrics(&state.metrics, &snapshot, &state.site_id);
            response(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/snapshot") => {
            let snapshot = *state.snapshots.borrow();
            json_response(StatusCode::OK, &snapshot)
        }
        (&Method::GET, "/health") => response(StatusCode::OK, "text/plain", "ok"),
        (&Method::GET, "/settings") => match state.counter.settings().await {
            Ok(settings) => json_response(StatusCode::OK, &settings),
            Err(e) => command_error_response("settings", e),
        },
        (&Method::POST, "/reset") => match state.counter.reset().await {
            Ok(snapshot) => {
                info!("manual_reset");
                json_response(StatusCode::OK, &snapshot)
            }
            Err(e) => command_error_response("reset", e),
        },
        (&Method::POST, "/capacity") => set_capacity(body, &state.counter).await,
        (&Method::POST, "/configure") => configure(body, &state.counter).await,
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(resp)
}

/// Start the status HTTP server and serve until shutdown
pub async fn start_status_server(
    port: u16,
    state: StatusState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, site = %state.site_id, "status_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle_request(req, state.clone()));

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("status_server_shutdown");
                return Ok(());
            }
        }
    }
}
