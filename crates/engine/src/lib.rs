pub mod assemble;
pub mod compile;
pub mod decode;
pub mod logfmt;
pub mod normalize;

pub use assemble::{PushOutcome, TraceAssembler, assemble};
pub use compile::{CompiledQuery, QueryCompiler};
pub use decode::Fragment;
