//! Fixtures and an in-process mock of the trace-search and log-store
//! backends.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, serve};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{Value, json};
use spanbridge_core::config::Config;
use tokio::net::TcpListener;

/// Two log lines of one trace: a root span in `api` and a child span in
/// `cache`, in the key:value line format.
pub fn sample_trace_lines(trace_id_low: u64) -> Vec<(String, String)> {
    let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    vec![
        (
            "api".to_string(),
            format!(
                "trace_id_low:{trace_id_low} trace_id_high:0 span_id:1 operation_name:\"GET /v1/orders\" \
                 flags:1 duration:1.8s start_time:{} tags:\"http.method:GET error:true\" process_id:p1",
                base.to_rfc3339()
            ),
        ),
        (
            "cache".to_string(),
            format!(
                "trace_id_low:{trace_id_low} trace_id_high:0 span_id:2 parent_span_id:1 \
                 operation_name:\"cache.get redis\" duration:700ms start_time:{} \
                 tags:\"peer:redis:6379\" process_id:p2",
                (base + Duration::milliseconds(900)).to_rfc3339()
            ),
        ),
    ]
}

/// Log-store response body with one stream per `(service, line)` pair.
pub fn loki_body(lines: &[(String, String)]) -> Value {
    let result: Vec<Value> = lines
        .iter()
        .map(|(service, line)| {
            json!({
                "stream": {"env": "prod", "service_name": service},
                "values": [["1769904000000000000", line]],
            })
        })
        .collect();
    json!({"status": "success", "data": {"resultType": "streams", "result": result}})
}

pub fn tag_values_body(values: &[&str]) -> Value {
    json!({"tagValues": values})
}

/// Trace-search response body from `(traceID, rootServiceName, rootTraceName)`.
pub fn search_body(traces: &[(&str, &str, &str)]) -> Value {
    let traces: Vec<Value> = traces
        .iter()
        .map(|(id, service, name)| {
            json!({
                "traceID": id,
                "rootServiceName": service,
                "rootTraceName": name,
                "startTimeUnixNano": "1769904000000000000",
                "durationMs": 1800
            })
        })
        .collect();
    json!({"traces": traces})
}

/// Trace-by-id body with one batch per service, each carrying one span.
pub fn otlp_trace_body(trace_id: &str, services: &[&str]) -> Value {
    let batches: Vec<Value> = services
        .iter()
        .enumerate()
        .map(|(i, service)| {
            json!({
                "resource": {"attributes": [
                    {"key": "service.name", "value": {"stringValue": service}},
                    {"key": "host.name", "value": {"stringValue": format!("node-{i}")}}
                ]},
                "instrumentationLibrarySpans": [{"spans": [{
                    "traceId": trace_id,
                    "spanId": format!("span-{i}"),
                    "parentSpanId": if i == 0 { String::new() } else { "span-0".to_string() },
                    "name": format!("{service}.handle"),
                    "kind": if i == 0 { 2 } else { 3 },
                    "startTimeUnixNano": "1769904000000000000",
                    "endTimeUnixNano": "1769904000250000000",
                    "attributes": [
                        {"key": "http.status_code", "value": {"intValue": "200"}}
                    ]
                }]}]
            })
        })
        .collect();
    json!({"batches": batches})
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct MockState {
    status: Option<StatusCode>,
    services: Vec<String>,
    search: Option<Value>,
    traces: HashMap<String, Value>,
    loki: Vec<(String, Value)>,
    requests: Vec<RecordedRequest>,
}

/// Serves canned bodies for every backend route and records each request.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `status` and an empty body.
    pub fn with_status(self, status: StatusCode) -> Self {
        self.lock().status = Some(status);
        self
    }

    pub fn with_services(self, services: &[&str]) -> Self {
        self.lock().services = services.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_search(self, body: Value) -> Self {
        self.lock().search = Some(body);
        self
    }

    pub fn with_trace(self, id: &str, body: Value) -> Self {
        self.lock().traces.insert(id.to_string(), body);
        self
    }

    /// Range queries whose `query` contains `needle` get `body`. The first
    /// registered match wins; unmatched queries get an empty result.
    pub fn with_loki(self, needle: &str, body: Value) -> Self {
        self.lock().loki.push((needle.to_string(), body));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, path_prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with(path_prefix))
            .collect()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/search/tag/{tag}/values", get(tag_values))
            .route("/api/search", get(search))
            .route("/api/traces/{id}", get(trace_by_id))
            .route("/loki/api/v1/query_range", get(query_range))
            .with_state(self.clone())
    }

    pub async fn spawn(&self) -> anyhow::Result<SocketAddr> {
        spawn_router(self.router()).await
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, uri: &Uri, params: HashMap<String, String>) -> Option<StatusCode> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            path: uri.path().to_string(),
            params,
        });
        state.status
    }
}

/// Binds `router` to an ephemeral localhost port and serves it in the
/// background.
pub async fn spawn_router(router: Router) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = serve(listener, router).await;
    });
    Ok(addr)
}

/// Config with both backends pointing at `addr`.
pub fn config_for(addr: SocketAddr) -> Config {
    Config {
        tempo_url: format!("http://{addr}"),
        loki_url: format!("http://{addr}"),
        ..Config::default()
    }
}

/// An address nothing listens on.
pub fn closed_addr() -> anyhow::Result<SocketAddr> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?)
}

async fn tag_values(
    State(mock): State<MockBackend>,
    Path(_tag): Path<String>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(status) = mock.record(&uri, params) {
        return status.into_response();
    }
    let services = mock.lock().services.clone();
    let services: Vec<&str> = services.iter().map(String::as_str).collect();
    Json(tag_values_body(&services)).into_response()
}

async fn search(
    State(mock): State<MockBackend>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(status) = mock.record(&uri, params) {
        return status.into_response();
    }
    let body = mock.lock().search.clone().unwrap_or_else(|| json!({"traces": []}));
    Json(body).into_response()
}

async fn trace_by_id(
    State(mock): State<MockBackend>,
    Path(id): Path<String>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(status) = mock.record(&uri, params) {
        return status.into_response();
    }
    match mock.lock().traces.get(&id).cloned() {
        Some(body) => Json(body).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn query_range(
    State(mock): State<MockBackend>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let query = params.get("query").cloned().unwrap_or_default();
    if let Some(status) = mock.record(&uri, params) {
        return status.into_response();
    }
    let body = mock
        .lock()
        .loki
        .iter()
        .find(|(needle, _)| query.contains(needle.as_str()))
        .map(|(_, body)| body.clone())
        .unwrap_or_else(|| loki_body(&[]));
    Json(body).into_response()
}
