//! Turns raw backend fragments into [`DecodedSpan`]s.

mod logline;
mod otlp;

use std::collections::BTreeMap;

use spanbridge_core::error::Result;
use spanbridge_core::filter::Dialect;
use spanbridge_core::model::DecodedSpan;
use spanbridge_core::wire::{LokiQueryResponse, Resource, OtlpSpan, TraceByIdResponse};

pub use logline::{decode_identity, decode_log_line};
pub use otlp::{decode_attribute_list, decode_otlp_span};

/// One undecoded span as it arrived from a backend.
#[derive(Debug, Clone, Copy)]
pub enum Fragment<'a> {
    /// Shape A: a log line plus the labels of the stream it came from.
    LogLine {
        labels: &'a BTreeMap<String, String>,
        line: &'a str,
    },
    /// Shape B: an OTLP/JSON span plus its batch resource.
    Otlp {
        resource: &'a Resource,
        span: &'a OtlpSpan,
    },
}

impl Fragment<'_> {
    pub fn decode(&self, dialect: Dialect) -> Result<DecodedSpan> {
        match *self {
            Fragment::LogLine { labels, line } => decode_log_line(labels, line),
            Fragment::Otlp { resource, span } => decode_otlp_span(resource, span, dialect),
        }
    }
}

pub fn log_fragments(response: &LokiQueryResponse) -> impl Iterator<Item = Fragment<'_>> {
    response.data.result.iter().flat_map(|stream| {
        stream.values.iter().map(move |entry| Fragment::LogLine {
            labels: &stream.stream,
            line: entry.line(),
        })
    })
}

pub fn otlp_fragments(response: &TraceByIdResponse) -> impl Iterator<Item = Fragment<'_>> {
    response.batches.iter().flat_map(|batch| {
        batch.scope_spans.iter().flat_map(move |scope| {
            scope.spans.iter().map(move |span| Fragment::Otlp {
                resource: &batch.resource,
                span,
            })
        })
    })
}
