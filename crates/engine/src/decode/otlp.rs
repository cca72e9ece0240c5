use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use spanbridge_core::error::{BridgeError, Result};
use spanbridge_core::filter::Dialect;
use spanbridge_core::ids::{SpanIdentity, TraceIdentity};
use spanbridge_core::model::{Attribute, AttributeValue, DecodedSpan, ProcessDescriptor};
use spanbridge_core::wire::{KeyValue, OtlpSpan, OtlpStatus, Resource};
use tracing::{debug, warn};

use crate::normalize::{json_i64, normalize_any_value, render_value};

/// Decodes one OTLP/JSON span. Upstream trace and span ids are opaque and
/// are hashed into identities. The resource attribute named by the dialect
/// becomes the process service name; the others become process tags.
pub fn decode_otlp_span(
    resource: &Resource,
    span: &OtlpSpan,
    dialect: Dialect,
) -> Result<DecodedSpan> {
    let mut tags = match &span.attributes {
        Some(raw) => decode_attribute_list(raw)?,
        None => Vec::new(),
    };
    if let Some(kind) = &span.kind {
        inject_span_kind_tag(&mut tags, kind);
    }
    if let Some(status) = &span.status {
        inject_span_status_tags(&mut tags, status);
    }

    let start = span
        .start_time_unix_nano
        .as_ref()
        .and_then(json_i64)
        .filter(|n| *n >= 0);
    let end = span
        .end_time_unix_nano
        .as_ref()
        .and_then(json_i64)
        .filter(|n| *n >= 0);
    let elapsed = start.zip(end).and_then(|(start, end)| end.checked_sub(start));
    let duration = match elapsed {
        Some(nanos) if nanos >= 0 => Duration::from_nanos(nanos as u64),
        _ => {
            debug!(
                span_id = %span.span_id,
                ?start,
                ?end,
                "span timestamps missing, negative or reversed, duration set to zero"
            );
            Duration::ZERO
        }
    };
    let start_time = start
        .map(DateTime::<Utc>::from_timestamp_nanos)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let service_key = dialect.service_name_key();
    let mut process = ProcessDescriptor::default();
    for kv in &resource.attributes {
        let Some(attr) = normalize_any_value(&kv.key, &kv.value) else {
            continue;
        };
        if attr.key == service_key {
            process.service_name = render_value(&attr.value);
        } else {
            process.tags.push(attr);
        }
    }

    Ok(DecodedSpan {
        trace_id: TraceIdentity::from_upstream(&span.trace_id),
        span_id: SpanIdentity::from_upstream(&span.span_id),
        parent_span_id: (!span.parent_span_id.is_empty())
            .then(|| SpanIdentity::from_upstream(&span.parent_span_id)),
        operation_name: span.name.clone(),
        start_time,
        duration,
        flags: span.flags.unwrap_or(0),
        tags,
        process_id: String::new(),
        process,
    })
}

/// Decodes a span `attributes` container. A missing container is empty; a
/// container that is not a list is a decode error. Entries that do not
/// parse, or whose value has no supported shape, are dropped.
pub fn decode_attribute_list(raw: &JsonValue) -> Result<Vec<Attribute>> {
    let entries = match raw {
        JsonValue::Null => return Ok(Vec::new()),
        JsonValue::Array(entries) => entries,
        other => {
            return Err(BridgeError::Decode(format!(
                "span attributes are not a list: {other}"
            )));
        }
    };

    let mut attrs = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<KeyValue>(entry.clone()) {
            Ok(kv) => attrs.extend(normalize_any_value(&kv.key, &kv.value)),
            Err(err) => debug!(error = %err, "dropping malformed span attribute"),
        }
    }
    Ok(attrs)
}

fn inject_span_kind_tag(tags: &mut Vec<Attribute>, kind: &JsonValue) {
    let kind = match kind {
        JsonValue::Number(n) => match n.as_u64() {
            Some(0 | 1) => return,
            Some(2) => "server",
            Some(3) => "client",
            Some(4) => "producer",
            Some(5) => "consumer",
            _ => {
                warn!(%kind, "unknown span kind");
                return;
            }
        },
        JsonValue::String(s) => match s.as_str() {
            "SPAN_KIND_UNSPECIFIED" | "SPAN_KIND_INTERNAL" => return,
            "SPAN_KIND_SERVER" => "server",
            "SPAN_KIND_CLIENT" => "client",
            "SPAN_KIND_PRODUCER" => "producer",
            "SPAN_KIND_CONSUMER" => "consumer",
            _ => {
                warn!(%kind, "unknown span kind");
                return;
            }
        },
        _ => return,
    };
    tags.push(Attribute::string("span.kind", kind));
}

fn inject_span_status_tags(tags: &mut Vec<Attribute>, status: &OtlpStatus) {
    if !status.message.is_empty() {
        tags.push(Attribute::string(
            "otel.status_description",
            status.message.clone(),
        ));
    }
    let code = match &status.code {
        Some(JsonValue::Number(n)) => n.as_u64().unwrap_or(0),
        Some(JsonValue::String(s)) => match s.as_str() {
            "STATUS_CODE_OK" => 1,
            "STATUS_CODE_ERROR" => 2,
            _ => 0,
        },
        _ => 0,
    };
    let code = match code {
        1 => "OK",
        2 => "ERROR",
        _ => return,
    };
    tags.push(Attribute::string("otel.status_code", code));
    if code == "ERROR" {
        tags.retain(|t| t.key != "error");
        tags.push(Attribute::new("error", AttributeValue::Bool(true)));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn resource(service_key: &str) -> Resource {
        serde_json::from_value(json!({
            "attributes": [
                {"key": service_key, "value": {"stringValue": "checkout"}},
                {"key": "host.name", "value": {"stringValue": "node-1"}}
            ]
        }))
        .unwrap()
    }

    fn span(extra: JsonValue) -> OtlpSpan {
        let mut base = json!({
            "traceId": "AAAAAAAAAAAAAAAAAAAAAA==",
            "spanId": "AAAAAAAAAAE=",
            "name": "HTTP GET",
            "startTimeUnixNano": "1700000000000000000",
            "endTimeUnixNano": "1700000000250000000"
        });
        if let (Some(base), JsonValue::Object(extra)) = (base.as_object_mut(), extra) {
            base.extend(extra);
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn decodes_identity_process_and_duration() {
        let decoded =
            decode_otlp_span(&resource("service.name"), &span(json!({})), Dialect::Standard)
                .unwrap();
        assert_eq!(
            decoded.trace_id,
            TraceIdentity::from_upstream("AAAAAAAAAAAAAAAAAAAAAA==")
        );
        assert_eq!(decoded.trace_id.low, decoded.trace_id.high);
        assert_eq!(decoded.span_id, SpanIdentity::from_upstream("AAAAAAAAAAE="));
        assert_eq!(decoded.parent_span_id, None);
        assert_eq!(decoded.operation_name, "HTTP GET");
        assert_eq!(decoded.duration, Duration::from_millis(250));
        assert_eq!(decoded.start_time.timestamp(), 1_700_000_000);
        assert_eq!(decoded.process.service_name, "checkout");
        assert_eq!(decoded.process.tags, vec![Attribute::string("host.name", "node-1")]);
    }

    #[test]
    fn legacy_dialect_reads_its_own_service_key() {
        let decoded =
            decode_otlp_span(&resource("service_name"), &span(json!({})), Dialect::Legacy)
                .unwrap();
        assert_eq!(decoded.process.service_name, "checkout");

        let decoded =
            decode_otlp_span(&resource("service_name"), &span(json!({})), Dialect::Standard)
                .unwrap();
        assert_eq!(decoded.process.service_name, "");
        assert_eq!(decoded.process.tags.len(), 2);
    }

    #[test]
    fn reversed_or_missing_timestamps_give_zero_duration() {
        let reversed = span(json!({"endTimeUnixNano": "1"}));
        let decoded =
            decode_otlp_span(&Resource::default(), &reversed, Dialect::Standard).unwrap();
        assert_eq!(decoded.duration, Duration::ZERO);

        let garbled = span(json!({"startTimeUnixNano": "soon"}));
        let decoded = decode_otlp_span(&Resource::default(), &garbled, Dialect::Standard).unwrap();
        assert_eq!(decoded.duration, Duration::ZERO);
        assert_eq!(decoded.start_time, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn negative_timestamps_give_zero_duration() {
        let extreme = span(json!({
            "startTimeUnixNano": "-9223372036854775808",
            "endTimeUnixNano": "1"
        }));
        let decoded = decode_otlp_span(&Resource::default(), &extreme, Dialect::Standard).unwrap();
        assert_eq!(decoded.duration, Duration::ZERO);
        assert_eq!(decoded.start_time, DateTime::<Utc>::UNIX_EPOCH);

        let negative_start = span(json!({"startTimeUnixNano": "-5", "endTimeUnixNano": "10"}));
        let decoded =
            decode_otlp_span(&Resource::default(), &negative_start, Dialect::Standard).unwrap();
        assert_eq!(decoded.duration, Duration::ZERO);
    }

    #[test]
    fn attributes_kind_status_and_parent() {
        let raw = span(json!({
            "parentSpanId": "AAAAAAAAAAA=",
            "kind": 2,
            "status": {"code": 2, "message": "boom"},
            "attributes": [
                {"key": "http.status_code", "value": {"intValue": "500"}},
                {"key": "error", "value": {"boolValue": false}},
                {"key": "weird", "value": {"kvlistValue": {"values": []}}},
                "not-a-key-value"
            ]
        }));
        let decoded = decode_otlp_span(&Resource::default(), &raw, Dialect::Standard).unwrap();
        assert_eq!(
            decoded.parent_span_id,
            Some(SpanIdentity::from_upstream("AAAAAAAAAAA="))
        );
        assert_eq!(
            decoded.tags,
            vec![
                Attribute::new("http.status_code", AttributeValue::Int64(500)),
                Attribute::string("span.kind", "server"),
                Attribute::string("otel.status_description", "boom"),
                Attribute::string("otel.status_code", "ERROR"),
                Attribute::new("error", AttributeValue::Bool(true)),
            ]
        );
    }

    #[test]
    fn non_list_attributes_fail() {
        let raw = span(json!({"attributes": {"http.method": "GET"}}));
        let err = decode_otlp_span(&Resource::default(), &raw, Dialect::Standard).unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
        assert!(decode_attribute_list(&JsonValue::Null).unwrap().is_empty());
    }
}
