pub mod attribute;
pub mod span;
pub mod trace;

pub use attribute::{Attribute, AttributeValue};
pub use span::{DecodedSpan, ProcessDescriptor};
pub use trace::{AssembledTrace, ProcessMapping};
