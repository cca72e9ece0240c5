use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use spanbridge_core::error::Result;
use spanbridge_core::ids::{SpanIdentity, TraceIdentity};
use spanbridge_core::model::{DecodedSpan, ProcessDescriptor};
use spanbridge_core::time::parse_duration_literal;
use tracing::debug;

use crate::logfmt::parse_pairs;
use crate::normalize::normalize_text_pairs;

const SERVICE_LABEL: &str = "service_name";
const OPERATION_LABEL: &str = "operation_name";

/// Decodes a span log line. Non-empty `service_name` / `operation_name`
/// stream labels take precedence over the line's own values. Fields that
/// fail to parse fall back to zero values.
pub fn decode_log_line(labels: &BTreeMap<String, String>, line: &str) -> Result<DecodedSpan> {
    let mut span = DecodedSpan::default();
    let mut process = ProcessDescriptor::default();

    for (key, value) in parse_pairs(line)? {
        match key.as_str() {
            "trace_id_low" => span.trace_id.low = number(&key, &value),
            "trace_id_high" => span.trace_id.high = number(&key, &value),
            "span_id" => span.span_id = SpanIdentity(number(&key, &value)),
            "parent_span_id" | "parent_id" => {
                let parent = number(&key, &value);
                span.parent_span_id = (parent != 0).then_some(SpanIdentity(parent));
            }
            "operation_name" => span.operation_name = value,
            "service_name" => process.service_name = value,
            "flags" => span.flags = number(&key, &value),
            "duration" => span.duration = duration(&value),
            "start_time" => span.start_time = start_time(&value),
            "tags" => span.tags = normalize_text_pairs(parse_pairs(&value)?),
            "process_tags" => process.tags = normalize_text_pairs(parse_pairs(&value)?),
            "process_id" => span.process_id = value,
            _ => {}
        }
    }

    if let Some(service) = labels.get(SERVICE_LABEL).filter(|s| !s.is_empty()) {
        process.service_name = service.clone();
    }
    if let Some(operation) = labels.get(OPERATION_LABEL).filter(|s| !s.is_empty()) {
        span.operation_name = operation.clone();
    }
    span.process = process;
    Ok(span)
}

/// Reads only the trace identity of a log line, for id listings.
pub fn decode_identity(line: &str) -> Result<TraceIdentity> {
    let mut id = TraceIdentity::default();
    for (key, value) in parse_pairs(line)? {
        match key.as_str() {
            "trace_id_low" => id.low = number(&key, &value),
            "trace_id_high" => id.high = number(&key, &value),
            _ => {}
        }
    }
    Ok(id)
}

fn number<T: std::str::FromStr + Default>(key: &str, value: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        debug!(key, value, "unparsable numeric field");
        T::default()
    })
}

fn duration(value: &str) -> Duration {
    parse_duration_literal(value).unwrap_or_else(|err| {
        debug!(value, error = %err, "unparsable duration");
        Duration::ZERO
    })
}

fn start_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|err| {
            debug!(value, error = %err, "unparsable start time");
            DateTime::<Utc>::UNIX_EPOCH
        })
}
