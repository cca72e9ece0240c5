use spanbridge_core::error::Result;
use spanbridge_core::model::DecodedSpan;
use tracing::trace;

/// Write side of the storage interface. The backends are populated by
/// their own ingestion pipelines, so writes are accepted and discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpanWriter;

impl SpanWriter {
    pub fn write_span(&self, span: &DecodedSpan) -> Result<()> {
        trace!(trace_id = %span.trace_id, span_id = %span.span_id, "discarding span write");
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_close_are_accepted() {
        let writer = SpanWriter;
        assert!(writer.write_span(&DecodedSpan::default()).is_ok());
        assert!(writer.close().is_ok());
    }
}
