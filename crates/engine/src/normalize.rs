//! Conversions between open-ended attribute bags and [`Attribute`].
//!
//! Inference order is string, byte sequence, boolean, 64-bit integer,
//! 64-bit float; the first shape that matches wins. Anything else is
//! dropped without error.

use base64::Engine;
use serde_json::Value as JsonValue;
use spanbridge_core::model::attribute::merge_attributes;
use spanbridge_core::model::{Attribute, AttributeValue};
use spanbridge_core::wire::AnyValue;

/// Plain JSON values. JSON has no byte-sequence shape, so that step never
/// matches here.
pub fn normalize_json(key: &str, value: &JsonValue) -> Option<Attribute> {
    let value = match value {
        JsonValue::String(s) => AttributeValue::String(s.clone()),
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int64(i),
            None => AttributeValue::Float64(n.as_f64()?),
        },
        _ => return None,
    };
    Some(Attribute::new(key, value))
}

/// OTLP/JSON `AnyValue` wrappers.
pub fn normalize_any_value(key: &str, value: &AnyValue) -> Option<Attribute> {
    if let Some(s) = &value.string_value {
        return Some(Attribute::string(key, s.clone()));
    }
    if let Some(encoded) = &value.bytes_value {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap_or_else(|_| encoded.clone().into_bytes());
        return Some(Attribute::new(key, AttributeValue::Binary(bytes)));
    }
    if let Some(b) = value.bool_value {
        return Some(Attribute::new(key, AttributeValue::Bool(b)));
    }
    if let Some(i) = value.int_value.as_ref().and_then(json_i64) {
        return Some(Attribute::new(key, AttributeValue::Int64(i)));
    }
    if let Some(f) = value.double_value.as_ref().and_then(json_f64) {
        return Some(Attribute::new(key, AttributeValue::Float64(f)));
    }
    None
}

/// Untyped `key -> text` pairs from log lines. Repeated keys keep the last
/// value.
pub fn normalize_text_pairs(pairs: Vec<(String, String)>) -> Vec<Attribute> {
    let mut out = Vec::with_capacity(pairs.len());
    let attrs: Vec<Attribute> = pairs
        .into_iter()
        .map(|(k, v)| Attribute::string(k, v))
        .collect();
    merge_attributes(&mut out, &attrs);
    out
}

/// Renders `key:value` as used in filter text. Binary values are
/// reinterpreted as UTF-8, lossily.
pub fn render_token(attr: &Attribute) -> String {
    format!("{}:{}", attr.key, render_value(&attr.value))
}

pub fn render_tokens(attrs: &[Attribute]) -> String {
    attrs.iter().map(render_token).collect::<Vec<_>>().join(" ")
}

pub fn render_value(value: &AttributeValue) -> String {
    match value {
        AttributeValue::String(s) => s.clone(),
        AttributeValue::Bool(b) => b.to_string(),
        AttributeValue::Int64(i) => i.to_string(),
        AttributeValue::Float64(f) => format!("{f:E}"),
        AttributeValue::Binary(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

pub(crate) fn json_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}
