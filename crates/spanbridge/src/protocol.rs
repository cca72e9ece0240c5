use serde::{Deserialize, Serialize};
use spanbridge_core::ids::TraceIdentity;
use spanbridge_core::model::AssembledTrace;
use spanbridge_core::query::{Operation, TraceQuery};

/// One read operation, as carried inside a query handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiRequest {
    Services,
    Operations { service: String },
    Trace { trace_id: TraceIdentity },
    FindTraces(TraceQuery),
    FindTraceIds(TraceQuery),
    Compile(TraceQuery),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiResponse {
    Services(Vec<String>),
    Operations(Vec<Operation>),
    Trace(AssembledTrace),
    Traces(Vec<AssembledTrace>),
    TraceIds(Vec<TraceIdentity>),
    Compiled {
        search_filter: String,
        log_filter: String,
    },
    Error(String),
}
