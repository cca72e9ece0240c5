//! JSON response shapes of the two downstream services.
//!
//! Every field is defaulted so a partially populated body still decodes;
//! only a structurally wrong envelope fails deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// Log store: `GET /loki/api/v1/query_range`

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LokiQueryResponse {
    #[serde(default)]
    pub data: LokiData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LokiData {
    #[serde(default)]
    pub result: Vec<LokiStream>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LokiStream {
    #[serde(default)]
    pub stream: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<LokiEntry>,
}

/// `[timestamp, line]` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LokiEntry(pub String, pub String);

impl LokiEntry {
    pub fn line(&self) -> &str {
        &self.1
    }
}

impl LokiQueryResponse {
    pub fn entry_count(&self) -> usize {
        self.data.result.iter().map(|s| s.values.len()).sum()
    }
}

// Trace search: `/api/search/tag/<tag>/values`, `/api/search`, `/api/traces/<id>`

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagValuesResponse {
    #[serde(default, rename = "tagValues")]
    pub tag_values: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSearchResponse {
    #[serde(default)]
    pub traces: Vec<TraceSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    #[serde(default, rename = "traceID")]
    pub trace_id: String,
    #[serde(default)]
    pub root_service_name: String,
    #[serde(default)]
    pub root_trace_name: String,
    #[serde(default)]
    pub start_time_unix_nano: Option<JsonValue>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceByIdResponse {
    #[serde(default)]
    pub batches: Vec<Batch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub resource: Resource,
    #[serde(
        default,
        rename = "instrumentationLibrarySpans",
        alias = "scopeSpans"
    )]
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeSpans {
    #[serde(default)]
    pub spans: Vec<OtlpSpan>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpan {
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: String,
    #[serde(default)]
    pub name: String,
    /// Numeric enum or its `SPAN_KIND_*` name.
    #[serde(default)]
    pub kind: Option<JsonValue>,
    /// String or number, nanoseconds since the epoch.
    #[serde(default)]
    pub start_time_unix_nano: Option<JsonValue>,
    #[serde(default)]
    pub end_time_unix_nano: Option<JsonValue>,
    #[serde(default)]
    pub flags: Option<u32>,
    /// Kept raw; the span decoder owns its interpretation.
    #[serde(default)]
    pub attributes: Option<JsonValue>,
    #[serde(default)]
    pub status: Option<OtlpStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtlpStatus {
    #[serde(default)]
    pub code: Option<JsonValue>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: AnyValue,
}

/// OTLP/JSON value wrapper. Array and key-list values are not modelled and
/// deserialize to an all-`None` value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<bool>,
    /// OTLP/JSON encodes 64-bit integers as strings; numbers are accepted too.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_value: Option<JsonValue>,
}
