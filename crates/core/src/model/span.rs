use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SpanIdentity, TraceIdentity};
use crate::model::attribute::{Attribute, merge_attributes};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    pub service_name: String,
    pub tags: Vec<Attribute>,
}

impl ProcessDescriptor {
    /// Structural merge of another descriptor for the same process id.
    pub fn merge(&mut self, other: &ProcessDescriptor) {
        if !other.service_name.is_empty() {
            self.service_name = other.service_name.clone();
        }
        merge_attributes(&mut self.tags, &other.tags);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSpan {
    pub trace_id: TraceIdentity,
    pub span_id: SpanIdentity,
    pub parent_span_id: Option<SpanIdentity>,
    pub operation_name: String,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub flags: u32,
    pub tags: Vec<Attribute>,
    pub process_id: String,
    pub process: ProcessDescriptor,
}

impl Default for DecodedSpan {
    fn default() -> Self {
        Self {
            trace_id: TraceIdentity::default(),
            span_id: SpanIdentity::default(),
            parent_span_id: None,
            operation_name: String::new(),
            start_time: DateTime::<Utc>::UNIX_EPOCH,
            duration: Duration::ZERO,
            flags: 0,
            tags: Vec::new(),
            process_id: String::new(),
            process: ProcessDescriptor::default(),
        }
    }
}

impl DecodedSpan {
    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.duration)
            .map(|d| self.start_time + d)
            .unwrap_or(self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attribute::AttributeValue;

    #[test]
    fn default_span_is_zero_valued() {
        let span = DecodedSpan::default();
        assert!(span.trace_id.is_zero());
        assert_eq!(span.start_time, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(span.duration_ms(), 0);
        assert!(span.process.service_name.is_empty());
    }

    #[test]
    fn process_merge_keeps_service_when_other_is_blank() {
        let mut p = ProcessDescriptor {
            service_name: "api".into(),
            tags: vec![Attribute::string("host", "a")],
        };
        p.merge(&ProcessDescriptor {
            service_name: String::new(),
            tags: vec![Attribute::new("host", AttributeValue::String("b".into()))],
        });
        assert_eq!(p.service_name, "api");
        assert_eq!(p.tags, vec![Attribute::string("host", "b")]);
    }
}
