use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::filter::{Dialect, SearchBackend};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub tempo_url: String,
    pub loki_url: String,
    pub env_label: String,
    pub dialect: Dialect,
    pub search_backend: SearchBackend,
    pub trace_lookback: Duration,
    pub per_trace_limit: usize,
    pub operations_search_limit: usize,
    pub fetch_concurrency: usize,
    pub dedup_spans: bool,
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tempo_url: "http://localhost:3200".to_string(),
            loki_url: "http://localhost:3100".to_string(),
            env_label: "prod".to_string(),
            dialect: Dialect::Standard,
            search_backend: SearchBackend::Loki,
            trace_lookback: Duration::from_secs(60 * 60 * 24),
            per_trace_limit: 1000,
            operations_search_limit: 100_000,
            fetch_concurrency: 4,
            dedup_spans: false,
            request_timeout: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    tempo_url: Option<String>,
    loki_url: Option<String>,
    env_label: Option<String>,
    dialect: Option<String>,
    search_backend: Option<String>,
    trace_lookback: Option<String>,
    per_trace_limit: Option<usize>,
    operations_search_limit: Option<usize>,
    fetch_concurrency: Option<usize>,
    dedup_spans: Option<bool>,
    request_timeout: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("SPANBRIDGE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("spanbridge/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| BridgeError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        tempo_url: env::var("SPANBRIDGE_TEMPO_URL").ok(),
        loki_url: env::var("SPANBRIDGE_LOKI_URL").ok(),
        env_label: env::var("SPANBRIDGE_ENV_LABEL").ok(),
        dialect: env::var("SPANBRIDGE_DIALECT").ok(),
        search_backend: env::var("SPANBRIDGE_SEARCH_BACKEND").ok(),
        trace_lookback: env::var("SPANBRIDGE_TRACE_LOOKBACK").ok(),
        per_trace_limit: env_parse("SPANBRIDGE_PER_TRACE_LIMIT")?,
        operations_search_limit: env_parse("SPANBRIDGE_OPERATIONS_SEARCH_LIMIT")?,
        fetch_concurrency: env_parse("SPANBRIDGE_FETCH_CONCURRENCY")?,
        dedup_spans: env_parse("SPANBRIDGE_DEDUP_SPANS")?,
        request_timeout: env::var("SPANBRIDGE_REQUEST_TIMEOUT").ok(),
    })
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| BridgeError::Config(format!("bad {name} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.tempo_url {
        cfg.tempo_url = v;
    }
    if let Some(v) = overrides.loki_url {
        cfg.loki_url = v;
    }
    if let Some(v) = overrides.env_label {
        cfg.env_label = v;
    }
    if let Some(v) = overrides.dialect {
        cfg.dialect = Dialect::from_str(&v)
            .map_err(|e| BridgeError::Config(format!("bad dialect in {source}: {e}")))?;
    }
    if let Some(v) = overrides.search_backend {
        cfg.search_backend = SearchBackend::from_str(&v)
            .map_err(|e| BridgeError::Config(format!("bad search_backend in {source}: {e}")))?;
    }
    if let Some(v) = overrides.trace_lookback {
        cfg.trace_lookback = humantime::parse_duration(&v).map_err(|e| {
            BridgeError::Config(format!("bad trace_lookback in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.per_trace_limit {
        cfg.per_trace_limit = v;
    }
    if let Some(v) = overrides.operations_search_limit {
        cfg.operations_search_limit = v;
    }
    if let Some(v) = overrides.fetch_concurrency {
        if v == 0 {
            return Err(BridgeError::Config(format!(
                "fetch_concurrency in {source} must be at least 1"
            )));
        }
        cfg.fetch_concurrency = v;
    }
    if let Some(v) = overrides.dedup_spans {
        cfg.dedup_spans = v;
    }
    if let Some(v) = overrides.request_timeout {
        cfg.request_timeout = Some(humantime::parse_duration(&v).map_err(|e| {
            BridgeError::Config(format!("bad request_timeout in {source}: {e} (value={v})"))
        })?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_expected_backends() {
        let cfg = Config::default();
        assert_eq!(cfg.tempo_url, "http://localhost:3200");
        assert_eq!(cfg.loki_url, "http://localhost:3100");
        assert_eq!(cfg.env_label, "prod");
        assert_eq!(cfg.dialect, Dialect::Standard);
        assert_eq!(cfg.search_backend, SearchBackend::Loki);
    }

    #[test]
    fn default_has_lookback() {
        let cfg = Config::default();
        assert_eq!(cfg.trace_lookback, Duration::from_secs(86_400));
        assert!(cfg.request_timeout.is_none());
    }

    #[test]
    fn apply_file_overrides_updates_fields() {
        let mut cfg = Config::default();
        let file: ConfigOverrides = toml::from_str(
            r#"
            tempo_url = "http://tempo:3200"
            dialect = "legacy"
            search_backend = "tempo"
            trace_lookback = "2h"
            fetch_concurrency = 8
            dedup_spans = true
            request_timeout = "3s"
            "#,
        )
        .unwrap();

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.tempo_url, "http://tempo:3200");
        assert_eq!(cfg.loki_url, "http://localhost:3100");
        assert_eq!(cfg.dialect, Dialect::Legacy);
        assert_eq!(cfg.search_backend, SearchBackend::Tempo);
        assert_eq!(cfg.trace_lookback, Duration::from_secs(7200));
        assert_eq!(cfg.fetch_concurrency, 8);
        assert!(cfg.dedup_spans);
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn apply_overrides_rejects_bad_values() {
        let mut cfg = Config::default();
        let bad_dialect = ConfigOverrides {
            dialect: Some("yaml".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, bad_dialect, "config file").is_err());

        let zero_fanout = ConfigOverrides {
            fetch_concurrency: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, zero_fanout, "environment").is_err());
    }
}
