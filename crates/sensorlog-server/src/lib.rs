//! HTTP API over a live sampler.
//!
//! Serves the latest readings, per-sensor time series, exports, and control
//! output writes as JSON. The sampler keeps running in its own thread while
//! handlers read the shared store.

use std::io;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use sensorlog_core::control::ControlGateway;
use sensorlog_core::export::{self, Format, StructuredExport, TabularExport};
use sensorlog_core::{Sampler, SensorRecord, TimeSeriesStore};

/// Default number of records returned by `/api/timeseries/{key}`.
const DEFAULT_SERIES_LEN: usize = 300;

/// Shared server state.
pub struct AppState {
    store: Arc<TimeSeriesStore>,
    sampler: Mutex<Sampler>,
    gateway: ControlGateway,
    provider_name: String,
    interval_ms: u64,
}

impl AppState {
    /// Wrap a sampler (running or not). Control writes go to its provider.
    pub fn new(sampler: Sampler) -> Self {
        Self {
            store: Arc::clone(sampler.store()),
            gateway: ControlGateway::new(sampler.provider().clone()),
            provider_name: sampler.provider().name().to_string(),
            interval_ms: sampler.config().interval.as_millis() as u64,
            sampler: Mutex::new(sampler),
        }
    }
}

#[derive(Deserialize)]
struct SeriesParams {
    /// Number of most recent records; 0 means all.
    n: Option<usize>,
}

#[derive(Serialize)]
struct SensorEntry {
    key: String,
    #[serde(rename = "type")]
    kind: String,
    unit: &'static str,
    value: f64,
    #[serde(serialize_with = "sensorlog_core::sensor::serialize_timestamp")]
    timestamp: chrono::DateTime<Utc>,
}

#[derive(Serialize)]
struct SensorsResponse {
    sensors: Vec<SensorEntry>,
    count: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    provider: String,
    running: bool,
    ticks: u64,
    skipped_ticks: u64,
    records_written: u64,
    sensors: usize,
    total_records: usize,
}

async fn handle_latest(
    State(state): State<Arc<AppState>>,
) -> Json<std::collections::BTreeMap<String, SensorRecord>> {
    Json(state.store.latest_all())
}

async fn handle_sensors(State(state): State<Arc<AppState>>) -> Json<SensorsResponse> {
    let sensors: Vec<SensorEntry> = state
        .store
        .latest_all()
        .into_iter()
        .map(|(key, r)| SensorEntry {
            key,
            kind: r.kind.to_string(),
            unit: r.kind.unit(),
            value: r.value,
            timestamp: r.timestamp,
        })
        .collect();
    let count = sensors.len();
    Json(SensorsResponse { sensors, count })
}

async fn handle_timeseries(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<SeriesParams>,
) -> Json<Vec<SensorRecord>> {
    let n = params.n.unwrap_or(DEFAULT_SERIES_LEN);
    Json(state.store.timeseries(&key, n))
}

async fn handle_control(
    State(state): State<Arc<AppState>>,
    Path((key, percent)): Path<(String, f64)>,
) -> (StatusCode, Json<serde_json::Value>) {
    let gateway = state.gateway.clone();
    let request_key = key.clone();
    // Provider writes hit sysfs and share a lock with the sampler.
    let outcome =
        tokio::task::spawn_blocking(move || gateway.set_output(&request_key, percent)).await;

    match outcome {
        Ok(Ok(outcome)) => {
            let status = if outcome.success {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            (
                status,
                Json(serde_json::json!({
                    "success": outcome.success,
                    "key": outcome.key,
                    "percent": outcome.percent,
                })),
            )
        }
        Ok(Err(e)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "key": key,
                "percent": percent,
                "error": e.to_string(),
            })),
        ),
        Err(e) => {
            error!("control task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "key": key, "percent": percent })),
            )
        }
    }
}

fn attachment(format: Format) -> String {
    format!(
        "attachment; filename=\"{}\"",
        export::default_file_name(format, Utc::now())
    )
}

async fn handle_export_json(State(state): State<Arc<AppState>>) -> Response {
    let export = StructuredExport::from_store(&state.store, state.interval_ms);
    (
        [(header::CONTENT_DISPOSITION, attachment(Format::Json))],
        Json(export),
    )
        .into_response()
}

async fn handle_export_csv(State(state): State<Arc<AppState>>) -> Response {
    let csv = TabularExport::from_store(&state.store).to_csv_string();
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment(Format::Csv)),
        ],
        csv,
    )
        .into_response()
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.sampler.lock().await.stats();
    let store = state.store.stats();
    Json(HealthResponse {
        status: if stats.running { "sampling" } else { "idle" },
        provider: state.provider_name.clone(),
        running: stats.running,
        ticks: stats.ticks,
        skipped_ticks: stats.skipped_ticks,
        records_written: stats.records_written,
        sensors: store.sensors,
        total_records: store.total_records,
    })
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "sensorlog",
        "version": sensorlog_core::VERSION,
        "provider": state.provider_name,
        "sample_interval_ms": state.interval_ms,
        "sensors": state.store.stats().sensors,
        "endpoints": {
            "/": "This API index",
            "/api/latest": "Latest record for every sensor",
            "/api/sensors": "Sensors with kind, unit and latest value",
            "/api/timeseries/{key}": {
                "method": "GET",
                "params": {
                    "n": format!("Most recent records (default: {DEFAULT_SERIES_LEN}, 0 = all)")
                }
            },
            "/api/control/{key}/{percent}": {
                "method": "POST",
                "description": "Set a control output to 0-100%"
            },
            "/api/export/json": "Every retained record, grouped by sensor",
            "/api/export/csv": "Time-aligned rows, one column per sensor",
            "/health": "Sampler status and counters",
        }
    }))
}

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/api/latest", get(handle_latest))
        .route("/api/sensors", get(handle_sensors))
        .route("/api/timeseries/{key}", get(handle_timeseries))
        .route("/api/control/{key}/{percent}", post(handle_control))
        .route("/api/export/json", get(handle_export_json))
        .route("/api/export/csv", get(handle_export_csv))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve until Ctrl+C, then stop the sampler.
///
/// # Errors
///
/// Returns the I/O error if the address cannot be bound or serving fails.
pub async fn run_server(state: Arc<AppState>, host: &str, port: u16) -> io::Result<()> {
    let app = build_router(Arc::clone(&state));
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    let mut sampler = state.sampler.lock().await;
    if sampler.is_running() {
        sampler.stop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::TimeZone;
    use sensorlog_core::provider::{self, ProviderHandle, TelemetryProvider};
    use sensorlog_core::{Reading, SamplerConfig, SensorKind};
    use tower::ServiceExt;

    struct Fixed;

    impl TelemetryProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn poll(&mut self) -> Result<Vec<Reading>, provider::Error> {
            Ok(Vec::new())
        }

        fn set_control(&mut self, key: &str, _percent: f64) -> Result<bool, provider::Error> {
            Ok(key == "pwm1")
        }
    }

    fn router() -> Router {
        let store = Arc::new(TimeSeriesStore::new(100));
        for s in 0..5 {
            let ts = Utc.timestamp_opt(s, 0).unwrap();
            store.record("cpu", 40.0 + s as f64, SensorKind::Temperature, ts);
            if s % 2 == 0 {
                store.record("fan1", 1000.0, SensorKind::TachReading, ts);
            }
        }
        let sampler = Sampler::new(
            ProviderHandle::new(Box::new(Fixed)),
            store,
            SamplerConfig::default(),
        )
        .unwrap();
        build_router(Arc::new(AppState::new(sampler)))
    }

    async fn call(method: &str, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
        let resp = router()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec(), content_type)
    }

    async fn get_json(uri: &str) -> serde_json::Value {
        let (status, body, _) = call("GET", uri).await;
        assert_eq!(status, StatusCode::OK, "GET {uri}");
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn latest_returns_every_key() {
        let json = get_json("/api/latest").await;
        assert_eq!(json["cpu"]["value"], 44.0);
        assert_eq!(json["cpu"]["type"], "Temperature");
        assert_eq!(json["fan1"]["type"], "Fan");
    }

    #[tokio::test]
    async fn sensors_lists_units() {
        let json = get_json("/api/sensors").await;
        assert_eq!(json["count"], 2);
        assert_eq!(json["sensors"][0]["key"], "cpu");
        assert_eq!(json["sensors"][0]["unit"], "°C");
        assert_eq!(json["sensors"][1]["unit"], "RPM");
    }

    #[tokio::test]
    async fn timeseries_honors_n() {
        let json = get_json("/api/timeseries/cpu?n=2").await;
        let values: Vec<f64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["value"].as_f64().unwrap())
            .collect();
        assert_eq!(values, [43.0, 44.0]);

        assert_eq!(get_json("/api/timeseries/cpu?n=0").await.as_array().unwrap().len(), 5);
        assert_eq!(get_json("/api/timeseries/cpu").await.as_array().unwrap().len(), 5);
        assert_eq!(get_json("/api/timeseries/nope").await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn control_validates_percent() {
        let (status, body, _) = call("POST", "/api/control/pwm1/55").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["percent"], 55.0);

        let (status, body, _) = call("POST", "/api/control/pwm1/150").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);

        let (status, _, _) = call("POST", "/api/control/pwm9/50").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = call("POST", "/api/control/pwm1/loud").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn csv_export_is_text_csv() {
        let (status, body, content_type) = call("GET", "/api/export/csv").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/csv"));
        let csv = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,cpu,fan1");
        assert_eq!(lines.len(), 6);
        assert!(lines[2].ends_with(",41,"));
    }

    #[tokio::test]
    async fn json_export_groups_by_sensor() {
        let json = get_json("/api/export/json").await;
        assert_eq!(json["sample_interval_ms"], 100);
        assert_eq!(json["sensors"]["cpu"].as_array().unwrap().len(), 5);
        assert_eq!(json["sensors"]["fan1"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn health_reports_idle_sampler() {
        let json = get_json("/health").await;
        assert_eq!(json["status"], "idle");
        assert_eq!(json["running"], false);
        assert_eq!(json["provider"], "fixed");
        assert_eq!(json["total_records"], 8);
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let json = get_json("/").await;
        assert_eq!(json["name"], "sensorlog");
        assert!(json["endpoints"]["/api/latest"].is_string());
    }
}
