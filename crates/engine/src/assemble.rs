//! Groups decoded spans into traces.

use std::collections::{HashMap, HashSet};

use spanbridge_core::filter::Dialect;
use spanbridge_core::ids::{SpanIdentity, TraceIdentity};
use spanbridge_core::model::{AssembledTrace, DecodedSpan, ProcessMapping};
use tracing::warn;

use crate::decode::Fragment;

/// What [`TraceAssembler::push_if`] did with a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Kept,
    Rejected,
    Undecodable,
}

/// Accumulates fragments into traces keyed by [`TraceIdentity`]. Traces
/// keep first-seen order; spans keep arrival order. Every span appends
/// its own process mapping, so mappings may repeat.
#[derive(Debug, Default)]
pub struct TraceAssembler {
    dialect: Dialect,
    dedup_spans: bool,
    traces: Vec<AssembledTrace>,
    index: HashMap<TraceIdentity, usize>,
    seen: HashSet<(TraceIdentity, SpanIdentity)>,
    decode_failures: usize,
}

impl TraceAssembler {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Drop spans whose `(trace, span)` pair was already added.
    pub fn with_dedup(mut self, dedup_spans: bool) -> Self {
        self.dedup_spans = dedup_spans;
        self
    }

    /// Decodes and adds one fragment. Fragments that fail to decode are
    /// logged and skipped.
    pub fn push(&mut self, fragment: Fragment<'_>) {
        match fragment.decode(self.dialect) {
            Ok(span) => self.push_span(span),
            Err(err) => {
                self.decode_failures += 1;
                warn!(error = %err, "skipping undecodable span fragment");
            }
        }
    }

    /// Like [`push`](Self::push), but only keeps decoded spans accepted by
    /// `keep`.
    pub fn push_if(
        &mut self,
        fragment: Fragment<'_>,
        keep: impl Fn(&DecodedSpan) -> bool,
    ) -> PushOutcome {
        match fragment.decode(self.dialect) {
            Ok(span) if keep(&span) => {
                self.push_span(span);
                PushOutcome::Kept
            }
            Ok(_) => PushOutcome::Rejected,
            Err(err) => {
                self.decode_failures += 1;
                warn!(error = %err, "skipping undecodable span fragment");
                PushOutcome::Undecodable
            }
        }
    }

    pub fn extend<'a>(&mut self, fragments: impl IntoIterator<Item = Fragment<'a>>) {
        for fragment in fragments {
            self.push(fragment);
        }
    }

    pub fn push_span(&mut self, span: DecodedSpan) {
        if self.dedup_spans && !self.seen.insert((span.trace_id, span.span_id)) {
            return;
        }
        let slot = *self.index.entry(span.trace_id).or_insert_with(|| {
            self.traces.push(AssembledTrace::default());
            self.traces.len() - 1
        });
        let trace = &mut self.traces[slot];
        trace.process_map.push(ProcessMapping {
            process_id: span.process_id.clone(),
            process: span.process.clone(),
        });
        trace.spans.push(span);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn decode_failures(&self) -> usize {
        self.decode_failures
    }

    pub fn get(&self, id: &TraceIdentity) -> Option<&AssembledTrace> {
        self.index.get(id).map(|&slot| &self.traces[slot])
    }

    pub fn into_traces(self) -> Vec<AssembledTrace> {
        self.traces
    }

    pub fn into_map(self) -> HashMap<TraceIdentity, AssembledTrace> {
        self.index
            .into_iter()
            .map(|(id, slot)| (id, self.traces[slot].clone()))
            .collect()
    }
}

/// Assembles a batch of fragments in one pass.
pub fn assemble<'a>(
    fragments: impl IntoIterator<Item = Fragment<'a>>,
    dialect: Dialect,
) -> HashMap<TraceIdentity, AssembledTrace> {
    let mut assembler = TraceAssembler::new(dialect);
    assembler.extend(fragments);
    assembler.into_map()
}
