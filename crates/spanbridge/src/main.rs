mod output;
mod protocol;
mod telemetry;

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::Context;
use base64::Engine;
use chrono::{TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use spanbridge_core::config::Config;
use spanbridge_core::filter::{Dialect, SearchBackend, TagFilter};
use spanbridge_core::ids::TraceIdentity;
use spanbridge_core::query::TraceQuery;
use spanbridge_core::time::{parse_duration_str, parse_time_or_relative};
use spanbridge_store::SpanReader;

use crate::output::{
    print_compiled_human, print_operations_human, print_services_human, print_trace_human,
    print_trace_ids_human, print_traces_human,
};
use crate::protocol::{ApiRequest, ApiResponse};
use crate::telemetry::{init_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "spanbridge")]
#[command(about = "Query Tempo and Loki through a Jaeger-shaped span reader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    tempo_url: Option<String>,

    #[arg(long, global = true)]
    loki_url: Option<String>,

    #[arg(long, global = true, help = "standard or legacy")]
    dialect: Option<String>,

    #[arg(long, global = true, help = "Trace discovery backend: loki or tempo")]
    backend: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "List services known to the trace-search backend")]
    Services,
    #[command(about = "List root operation names of a service")]
    Operations { service: String },
    #[command(about = "Fetch one trace by its hex id")]
    Trace { trace_id: String },
    #[command(about = "Find and assemble traces matching a query")]
    Search(QueryArgs),
    #[command(about = "List trace ids of matching span lines")]
    TraceIds(QueryArgs),
    #[command(about = "Print the compiled backend filters without querying")]
    Compile(QueryArgs),
    #[command(about = "Execute a previously emitted handle")]
    Handle { handle: String },
}

#[derive(Args, Debug, Clone)]
struct QueryArgs {
    #[arg(long)]
    service: Option<String>,
    #[arg(long)]
    operation: Option<String>,
    #[arg(long = "tag", help = "Tag filter key=value, repeatable")]
    tags: Vec<String>,
    #[arg(long)]
    min_duration: Option<String>,
    #[arg(long)]
    max_duration: Option<String>,
    #[arg(long, default_value = "1h")]
    since: String,
    #[arg(long)]
    until: Option<String>,
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = load_config(&cli)?;

    let (req, emit_handle) = match cli.command {
        Commands::Services => (ApiRequest::Services, true),
        Commands::Operations { service } => (ApiRequest::Operations { service }, true),
        Commands::Trace { trace_id } => {
            let trace_id = TraceIdentity::parse_hex(&trace_id)?;
            (ApiRequest::Trace { trace_id }, true)
        }
        Commands::Search(args) => (ApiRequest::FindTraces(build_query(args)?), true),
        Commands::TraceIds(args) => (ApiRequest::FindTraceIds(build_query(args)?), true),
        Commands::Compile(args) => (ApiRequest::Compile(build_query(args)?), false),
        Commands::Handle { handle } => (decode_handle(&handle)?, false),
    };

    let handle = encode_handle(&req)?;
    let reader = SpanReader::new(cfg);
    let response = execute(&reader, req).await;
    let failed = matches!(response, ApiResponse::Error(_));
    print_response(&response, cli.json)?;
    if failed {
        anyhow::bail!("request failed");
    }
    if emit_handle && !cli.json {
        println!("handle={handle}");
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = &cli.tempo_url {
        cfg.tempo_url = v.clone();
    }
    if let Some(v) = &cli.loki_url {
        cfg.loki_url = v.clone();
    }
    if let Some(v) = &cli.dialect {
        cfg.dialect = Dialect::from_str(v)?;
    }
    if let Some(v) = &cli.backend {
        cfg.search_backend = SearchBackend::from_str(v)?;
    }
    Ok(cfg)
}

fn build_query(args: QueryArgs) -> anyhow::Result<TraceQuery> {
    let tags = args
        .tags
        .iter()
        .map(|t| TagFilter::parse(t).map(|f| (f.key, f.value)))
        .collect::<spanbridge_core::Result<BTreeMap<_, _>>>()?;
    let start_time_min = parse_time_or_relative(&args.since)?;
    let start_time_max = match args.until {
        Some(until) => parse_time_or_relative(&until)?,
        None => Utc::now(),
    };

    Ok(TraceQuery {
        service_name: args.service,
        operation_name: args.operation,
        tags,
        duration_min: parse_delta(args.min_duration.as_deref())?,
        duration_max: parse_delta(args.max_duration.as_deref())?,
        start_time_min,
        start_time_max,
        num_traces: args.limit,
    })
}

fn parse_delta(input: Option<&str>) -> anyhow::Result<TimeDelta> {
    let Some(input) = input else {
        return Ok(TimeDelta::zero());
    };
    let duration = parse_duration_str(input)?;
    TimeDelta::from_std(duration).with_context(|| format!("duration out of range: {input}"))
}

async fn execute(reader: &SpanReader, req: ApiRequest) -> ApiResponse {
    let resp = match req {
        ApiRequest::Services => reader.services().await.map(ApiResponse::Services),
        ApiRequest::Operations { service } => {
            reader.operations(&service).await.map(ApiResponse::Operations)
        }
        ApiRequest::Trace { trace_id } => reader.get_trace(trace_id).await.map(ApiResponse::Trace),
        ApiRequest::FindTraces(q) => reader.find_traces(&q).await.map(ApiResponse::Traces),
        ApiRequest::FindTraceIds(q) => reader.find_trace_ids(&q).await.map(ApiResponse::TraceIds),
        ApiRequest::Compile(q) => reader.compiler().compile(&q).map(|c| ApiResponse::Compiled {
            search_filter: c.search_filter,
            log_filter: c.log_filter,
        }),
    };

    resp.unwrap_or_else(|e| ApiResponse::Error(e.to_string()))
}

fn encode_handle(req: &ApiRequest) -> anyhow::Result<String> {
    let payload = serde_json::to_vec(req)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(payload))
}

fn decode_handle(handle: &str) -> anyhow::Result<ApiRequest> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(handle.trim())
        .context("decode handle")?;
    serde_json::from_slice(&bytes).context("parse handle payload")
}

fn print_response(response: &ApiResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    match response {
        ApiResponse::Services(v) => print_services_human(v),
        ApiResponse::Operations(v) => print_operations_human(v),
        ApiResponse::Trace(v) => print_trace_human(v),
        ApiResponse::Traces(v) => print_traces_human(v),
        ApiResponse::TraceIds(v) => print_trace_ids_human(v),
        ApiResponse::Compiled {
            search_filter,
            log_filter,
        } => print_compiled_human(search_filter, log_filter),
        ApiResponse::Error(e) => eprintln!("error: {e}"),
    }
    Ok(())
}
