//! HTTP access to the trace-search and log-store backends.
//!
//! One method per backend operation, each a single GET. Non-success
//! statuses, transport errors and undecodable bodies all surface as
//! [`BridgeError::Upstream`] tagged with the operation name.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use spanbridge_core::config::Config;
use spanbridge_core::error::{BridgeError, Result};
use spanbridge_core::time::format_duration_literal;
use spanbridge_core::wire::{
    LokiQueryResponse, TagValuesResponse, TraceByIdResponse, TraceSearchResponse,
};
use tracing::debug;

const SERVICE_TAG: &str = "service.name";

/// Parameters of a trace-search request. Zero durations are omitted.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub tags: String,
    pub limit: usize,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Parameters of a log-store range query.
#[derive(Debug, Clone)]
pub struct RangeRequest {
    pub query: String,
    pub limit: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    tempo_url: String,
    loki_url: String,
}

impl Fetcher {
    pub fn new(cfg: &Config) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = cfg.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap_or_else(|e| {
            tracing::warn!(error = ?e, "failed to build backend http client; using defaults");
            Client::new()
        });
        Self {
            client,
            tempo_url: cfg.tempo_url.trim_end_matches('/').to_string(),
            loki_url: cfg.loki_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn tag_values(&self, tag: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/search/tag/{tag}/values", self.tempo_url);
        let resp: TagValuesResponse = self.get_json("tag_values", &url, &[]).await?;
        Ok(resp.tag_values)
    }

    pub async fn services(&self) -> Result<Vec<String>> {
        self.tag_values(SERVICE_TAG).await
    }

    /// Trace search by a prepared `tags` filter only.
    pub async fn search_by_service(&self, tags: &str, limit: usize) -> Result<TraceSearchResponse> {
        let params = vec![("tags", tags.to_string()), ("limit", limit.to_string())];
        let url = format!("{}/api/search", self.tempo_url);
        self.get_json("search_by_service", &url, &params).await
    }

    pub async fn search(&self, req: &SearchRequest) -> Result<TraceSearchResponse> {
        let mut params = Vec::with_capacity(6);
        if !req.tags.is_empty() {
            params.push(("tags", req.tags.clone()));
        }
        if !req.min_duration.is_zero() {
            params.push(("minDuration", format_duration_literal(req.min_duration)));
        }
        if !req.max_duration.is_zero() {
            params.push(("maxDuration", format_duration_literal(req.max_duration)));
        }
        params.push(("limit", req.limit.to_string()));
        if let Some((start, end)) = req.window {
            params.push(("start", start.timestamp().to_string()));
            params.push(("end", end.timestamp().to_string()));
        }
        let url = format!("{}/api/search", self.tempo_url);
        self.get_json("search", &url, &params).await
    }

    pub async fn trace_by_id(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TraceByIdResponse> {
        let params = vec![
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
        ];
        let url = format!("{}/api/traces/{id}", self.tempo_url);
        self.get_json("trace_by_id", &url, &params).await
    }

    pub async fn query_range(&self, req: &RangeRequest) -> Result<LokiQueryResponse> {
        let params = vec![
            ("direction", "BACKWARD".to_string()),
            ("limit", req.limit.to_string()),
            ("query", req.query.clone()),
            ("start", unix_nanos(req.start).to_string()),
            ("end", unix_nanos(req.end).to_string()),
        ];
        let url = format!("{}/loki/api/v1/query_range", self.loki_url);
        self.get_json("query_range", &url, &params).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        debug!(operation, url, ?params, "backend request");
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| BridgeError::upstream(operation, e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::upstream(
                operation,
                format!("{status}: {}", body.trim()),
            ));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| BridgeError::upstream(operation, e))?;
        serde_json::from_slice(&body).map_err(|e| BridgeError::upstream(operation, e))
    }
}

fn unix_nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(i64::MAX)
}
