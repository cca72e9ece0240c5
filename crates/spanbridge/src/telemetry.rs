use std::io::IsTerminal;
use std::sync::{Mutex, OnceLock};

use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace as sdktrace;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs stderr logging filtered by `RUST_LOG`, plus OTLP export of the
/// bridge's own spans when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
pub fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact();

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt_layer)
        .with(build_otlp_layer())
        .try_init();
}

pub fn shutdown_tracing() {
    if let Some(provider) = otlp_provider_slot()
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
    {
        let _ = provider.shutdown();
    }
}

fn build_otlp_layer<S>() -> Option<OpenTelemetryLayer<S, sdktrace::Tracer>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("spanbridge: otlp exporter disabled: {err}");
            return None;
        }
    };

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();
    let tracer = provider.tracer("spanbridge");

    if let Ok(mut slot) = otlp_provider_slot().lock() {
        *slot = Some(provider);
    }

    Some(tracing_opentelemetry::layer().with_tracer(tracer))
}

fn otlp_provider_slot() -> &'static Mutex<Option<sdktrace::SdkTracerProvider>> {
    static SLOT: OnceLock<Mutex<Option<sdktrace::SdkTracerProvider>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}
