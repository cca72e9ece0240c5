use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TraceIdentity;
use crate::model::span::{DecodedSpan, ProcessDescriptor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMapping {
    pub process_id: String,
    pub process: ProcessDescriptor,
}

/// Spans grouped under one trace identity for the lifetime of a request.
/// The process map holds one entry per contributing fragment; repeated
/// pairs are expected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledTrace {
    pub spans: Vec<DecodedSpan>,
    pub process_map: Vec<ProcessMapping>,
}

impl AssembledTrace {
    pub fn trace_id(&self) -> Option<TraceIdentity> {
        self.spans.first().map(|s| s.trace_id)
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// One merged descriptor per process, first seen first. Mappings
    /// without a process id are grouped by service name.
    pub fn processes(&self) -> Vec<ProcessMapping> {
        let mut out: Vec<ProcessMapping> = Vec::new();
        let mut slots: HashMap<(bool, &str), usize> = HashMap::new();
        for mapping in &self.process_map {
            let key = if mapping.process_id.is_empty() {
                (false, mapping.process.service_name.as_str())
            } else {
                (true, mapping.process_id.as_str())
            };
            match slots.get(&key) {
                Some(&slot) => out[slot].process.merge(&mapping.process),
                None => {
                    slots.insert(key, out.len());
                    out.push(mapping.clone());
                }
            }
        }
        out
    }

    /// Distinct service names in first-seen order.
    pub fn services(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for process in self.processes() {
            let name = process.process.service_name;
            if !name.is_empty() && !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    pub fn time_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.spans.iter().map(|s| s.start_time).min()?;
        let end = self.spans.iter().map(|s| s.end_time()).max()?;
        Some((start, end))
    }
}
