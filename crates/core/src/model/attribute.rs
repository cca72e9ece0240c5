use serde::{Deserialize, Serialize};

/// Closed set of tag value shapes a span or process can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, AttributeValue::String(value.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Last write wins per key.
pub fn merge_attributes(into: &mut Vec<Attribute>, from: &[Attribute]) {
    for attr in from {
        match into.iter_mut().find(|a| a.key == attr.key) {
            Some(existing) => existing.value = attr.value.clone(),
            None => into.push(attr.clone()),
        }
    }
}
