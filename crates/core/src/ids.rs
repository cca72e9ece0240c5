use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// 128-bit trace identifier carried as two 64-bit halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceIdentity {
    pub low: u64,
    pub high: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanIdentity(pub u64);

impl TraceIdentity {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    /// Derives an identity from an opaque upstream id. Both halves carry the
    /// same FNV-1a digest of the id text.
    pub fn from_upstream(id: &str) -> Self {
        let digest = fnv1a(id);
        Self {
            low: digest,
            high: digest,
        }
    }

    /// Parses the 32-hex-digit form (high half first). Shorter inputs are
    /// treated as left-padded with zeros.
    pub fn parse_hex(input: &str) -> Result<Self> {
        if input.is_empty() || input.len() > 32 || !input.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(BridgeError::Parse(format!("invalid trace id: {input}")));
        }
        let padded = format!("{input:0>32}");
        let (high, low) = padded.split_at(16);
        let parse = |half: &str| {
            u64::from_str_radix(half, 16)
                .map_err(|e| BridgeError::Parse(format!("invalid trace id {input}: {e}")))
        };
        Ok(Self {
            low: parse(low)?,
            high: parse(high)?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.low == 0 && self.high == 0
    }
}

impl fmt::Display for TraceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.high, self.low)
    }
}

impl SpanIdentity {
    pub fn from_upstream(id: &str) -> Self {
        Self(fnv1a(id))
    }
}

impl fmt::Display for SpanIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn fnv1a(input: &str) -> u64 {
    // `Hash for str` appends a terminator byte, so feed the raw bytes instead.
    let mut hasher = FnvHasher::default();
    hasher.write(input.as_bytes());
    hasher.finish()
}
