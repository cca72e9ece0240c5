pub mod fetch;
pub mod reader;
pub mod writer;

pub use fetch::Fetcher;
pub use reader::SpanReader;
pub use writer::SpanWriter;
