//! Read operations over the two backends.
//!
//! Fetch failures are logged and turn into empty results; only an invalid
//! query is returned as an error.

use std::collections::HashSet;
use std::pin::pin;

use chrono::{TimeDelta, Utc};
use futures::StreamExt;
use futures::stream;
use spanbridge_core::config::Config;
use spanbridge_core::error::Result;
use spanbridge_core::filter::SearchBackend;
use spanbridge_core::ids::TraceIdentity;
use spanbridge_core::model::AssembledTrace;
use spanbridge_core::query::{Operation, TraceQuery};
use spanbridge_engine::decode::{decode_identity, log_fragments, otlp_fragments};
use spanbridge_engine::{PushOutcome, QueryCompiler, TraceAssembler};
use tracing::{debug, instrument, warn};

use crate::fetch::{Fetcher, RangeRequest, SearchRequest};

#[derive(Debug, Clone)]
pub struct SpanReader {
    cfg: Config,
    fetcher: Fetcher,
    compiler: QueryCompiler,
}

impl SpanReader {
    pub fn new(cfg: Config) -> Self {
        let fetcher = Fetcher::new(&cfg);
        let compiler = QueryCompiler::new(cfg.dialect, cfg.env_label.clone());
        Self {
            cfg,
            fetcher,
            compiler,
        }
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    #[instrument(skip(self))]
    pub async fn services(&self) -> Result<Vec<String>> {
        match self.fetcher.services().await {
            Ok(services) => Ok(services),
            Err(err) => {
                warn!(error = %err, "listing services failed");
                Ok(Vec::new())
            }
        }
    }

    /// Distinct non-empty root operation names, first seen first.
    #[instrument(skip(self))]
    pub async fn operations(&self, service: &str) -> Result<Vec<Operation>> {
        let filter = self.compiler.service_search_filter(service);
        let resp = match self
            .fetcher
            .search_by_service(&filter, self.cfg.operations_search_limit)
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "listing operations failed");
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::new();
        Ok(resp
            .traces
            .into_iter()
            .map(|t| t.root_trace_name)
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .map(|name| Operation { name })
            .collect())
    }

    /// Fetches one trace from the log store within the configured lookback.
    /// Lines are selected on the low half of the id; spans whose full id
    /// differs are dropped after decoding.
    #[instrument(skip(self), fields(trace_id = %id))]
    pub async fn get_trace(&self, id: TraceIdentity) -> Result<AssembledTrace> {
        let end = Utc::now();
        let lookback = TimeDelta::from_std(self.cfg.trace_lookback).unwrap_or(TimeDelta::days(1));
        let req = RangeRequest {
            query: self.compiler.trace_lookup(&id),
            limit: self.cfg.per_trace_limit,
            start: end - lookback,
            end,
        };
        debug!(query = %req.query, "trace lookup");

        let mut assembler = self.assembler();
        match self.fetcher.query_range(&req).await {
            Ok(resp) => {
                let foreign = log_fragments(&resp)
                    .map(|f| assembler.push_if(f, |span| span.trace_id == id))
                    .filter(|outcome| *outcome == PushOutcome::Rejected)
                    .count();
                if foreign > 0 {
                    debug!(foreign, "fragments not belonging to the trace");
                }
                if assembler.decode_failures() > 0 {
                    debug!(
                        failures = assembler.decode_failures(),
                        "undecodable trace fragments"
                    );
                }
            }
            Err(err) => warn!(error = %err, "trace lookup failed"),
        }
        Ok(assembler.into_traces().pop().unwrap_or_default())
    }

    /// Two-phase search: discover candidate ids with the configured search
    /// backend, then re-fetch each trace and assemble.
    #[instrument(skip(self, query), fields(backend = ?self.cfg.search_backend))]
    pub async fn find_traces(&self, query: &TraceQuery) -> Result<Vec<AssembledTrace>> {
        let compiled = self.compiler.compile(query)?;
        debug!(
            search_filter = %compiled.search_filter,
            log_filter = %compiled.log_filter,
            "compiled trace query"
        );

        match self.cfg.search_backend {
            SearchBackend::Loki => {
                let ids = self.discover_ids(compiled.log_filter, query).await;
                Ok(self.refetch_from_logs(&ids, query).await)
            }
            SearchBackend::Tempo => {
                let ids = self.search_ids(compiled.search_filter, query).await;
                Ok(self.refetch_from_search(&ids, query).await)
            }
        }
    }

    /// Ids of every matching fragment, in backend order. The same id may
    /// appear more than once.
    #[instrument(skip(self, query))]
    pub async fn find_trace_ids(&self, query: &TraceQuery) -> Result<Vec<TraceIdentity>> {
        let compiled = self.compiler.compile(query)?;
        let req = self.range_request(compiled.log_filter, query, query.num_traces);
        let resp = match self.fetcher.query_range(&req).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "trace id search failed");
                return Ok(Vec::new());
            }
        };

        let mut ids = Vec::with_capacity(resp.entry_count());
        for entry in resp.data.result.iter().flat_map(|s| &s.values) {
            match decode_identity(entry.line()) {
                Ok(id) => ids.push(id),
                Err(err) => warn!(error = %err, "skipping undecodable span line"),
            }
        }
        Ok(ids)
    }

    async fn discover_ids(&self, log_filter: String, query: &TraceQuery) -> Vec<TraceIdentity> {
        let req = self.range_request(log_filter, query, query.num_traces);
        let resp = match self.fetcher.query_range(&req).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "trace discovery failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        resp.data
            .result
            .iter()
            .flat_map(|s| &s.values)
            .filter_map(|entry| match decode_identity(entry.line()) {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable span line");
                    None
                }
            })
            .filter(|id| seen.insert(*id))
            .collect()
    }

    async fn search_ids(&self, search_filter: String, query: &TraceQuery) -> Vec<String> {
        let req = SearchRequest {
            tags: search_filter,
            limit: query.num_traces,
            min_duration: query.duration_min.to_std().unwrap_or_default(),
            max_duration: query.duration_max.to_std().unwrap_or_default(),
            window: Some((query.start_time_min, query.start_time_max)),
        };
        let resp = match self.fetcher.search(&req).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "trace search failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        resp.traces
            .into_iter()
            .map(|t| t.trace_id)
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect()
    }

    async fn refetch_from_logs(
        &self,
        ids: &[TraceIdentity],
        query: &TraceQuery,
    ) -> Vec<AssembledTrace> {
        let mut fetches = pin!(
            stream::iter(ids.iter().copied())
                .map(|id| {
                    let req = self.range_request(
                        self.compiler.trace_lookup(&id),
                        query,
                        self.cfg.per_trace_limit,
                    );
                    async move { (id, self.fetcher.query_range(&req).await) }
                })
                .buffered(self.cfg.fetch_concurrency.max(1))
        );

        let mut assembler = self.assembler();
        while let Some((id, result)) = fetches.next().await {
            match result {
                Ok(resp) => {
                    for fragment in log_fragments(&resp) {
                        assembler.push_if(fragment, |span| span.trace_id == id);
                    }
                }
                Err(err) => warn!(trace_id = %id, error = %err, "trace re-fetch failed"),
            }
        }
        assembler.into_traces()
    }

    async fn refetch_from_search(&self, ids: &[String], query: &TraceQuery) -> Vec<AssembledTrace> {
        let (start, end) = (query.start_time_min, query.start_time_max);
        let mut fetches = pin!(
            stream::iter(ids)
                .map(|id| async move { (id, self.fetcher.trace_by_id(id, start, end).await) })
                .buffered(self.cfg.fetch_concurrency.max(1))
        );

        let mut assembler = self.assembler();
        while let Some((id, result)) = fetches.next().await {
            match result {
                Ok(resp) => assembler.extend(otlp_fragments(&resp)),
                Err(err) => warn!(trace_id = %id, error = %err, "trace re-fetch failed"),
            }
        }
        assembler.into_traces()
    }

    fn assembler(&self) -> TraceAssembler {
        TraceAssembler::new(self.cfg.dialect).with_dedup(self.cfg.dedup_spans)
    }

    fn range_request(&self, query_text: String, query: &TraceQuery, limit: usize) -> RangeRequest {
        RangeRequest {
            query: query_text,
            limit,
            start: query.start_time_min,
            end: query.start_time_max,
        }
    }
}
