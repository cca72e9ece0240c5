use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Filter-string flavour understood by the backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Standard,
    Legacy,
}

impl Dialect {
    /// Resource attribute holding the service name in trace-by-id payloads.
    pub fn service_name_key(self) -> &'static str {
        match self {
            Self::Standard => "service.name",
            Self::Legacy => "service_name",
        }
    }
}

impl FromStr for Dialect {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "legacy" => Ok(Self::Legacy),
            _ => Err(BridgeError::Parse(format!("unknown dialect: {s}"))),
        }
    }
}

/// Backend used to discover candidate traces in `find_traces`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackend {
    #[default]
    Loki,
    Tempo,
}

impl FromStr for SearchBackend {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "loki" => Ok(Self::Loki),
            "tempo" => Ok(Self::Tempo),
            _ => Err(BridgeError::Parse(format!("unknown search backend: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    pub value: String,
}

impl TagFilter {
    pub fn parse(input: &str) -> Result<Self> {
        let (key, value) = input
            .split_once('=')
            .ok_or_else(|| BridgeError::Parse(format!("invalid tag filter: {input}")))?;

        if key.trim().is_empty() || value.trim().is_empty() {
            return Err(BridgeError::Parse(format!("invalid tag filter: {input}")));
        }

        Ok(Self {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        })
    }
}
