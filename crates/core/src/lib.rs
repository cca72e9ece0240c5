pub mod config;
pub mod error;
pub mod filter;
pub mod ids;
pub mod model;
pub mod query;
pub mod time;
pub mod wire;

pub use error::{BridgeError, Result};
pub use ids::{SpanIdentity, TraceIdentity};
