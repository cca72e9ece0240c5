use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceQuery {
    pub service_name: Option<String>,
    pub operation_name: Option<String>,
    /// Every entry must match.
    pub tags: BTreeMap<String, String>,
    /// Zero means unbounded.
    #[serde(with = "delta_nanos")]
    pub duration_min: TimeDelta,
    #[serde(with = "delta_nanos")]
    pub duration_max: TimeDelta,
    pub start_time_min: DateTime<Utc>,
    pub start_time_max: DateTime<Utc>,
    pub num_traces: usize,
}

impl Default for TraceQuery {
    fn default() -> Self {
        Self {
            service_name: None,
            operation_name: None,
            tags: BTreeMap::new(),
            duration_min: TimeDelta::zero(),
            duration_max: TimeDelta::zero(),
            start_time_min: DateTime::<Utc>::UNIX_EPOCH,
            start_time_max: DateTime::<Utc>::UNIX_EPOCH,
            num_traces: 20,
        }
    }
}

impl TraceQuery {
    pub fn service(&self) -> Option<&str> {
        self.service_name.as_deref().filter(|s| !s.is_empty())
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation_name.as_deref().filter(|s| !s.is_empty())
    }

    pub fn has_duration_bounds(&self) -> bool {
        !self.duration_min.is_zero() || !self.duration_max.is_zero()
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration_min < TimeDelta::zero() {
            return Err(BridgeError::InvalidQuery(format!(
                "negative minimum duration: {}",
                self.duration_min
            )));
        }
        if self.duration_max < TimeDelta::zero() {
            return Err(BridgeError::InvalidQuery(format!(
                "negative maximum duration: {}",
                self.duration_max
            )));
        }
        if !self.duration_min.is_zero()
            && !self.duration_max.is_zero()
            && self.duration_min > self.duration_max
        {
            return Err(BridgeError::InvalidQuery(format!(
                "minimum duration {} exceeds maximum {}",
                self.duration_min, self.duration_max
            )));
        }
        if self.start_time_min > self.start_time_max {
            return Err(BridgeError::InvalidQuery(format!(
                "time window start {} is after end {}",
                self.start_time_min.to_rfc3339(),
                self.start_time_max.to_rfc3339()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
}

mod delta_nanos {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        match value.num_nanoseconds() {
            Some(nanos) => serializer.serialize_i64(nanos),
            None => Err(serde::ser::Error::custom("duration out of range")),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        i64::deserialize(deserializer).map(TimeDelta::nanoseconds)
    }
}
