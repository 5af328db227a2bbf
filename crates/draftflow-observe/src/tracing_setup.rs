//! Global tracing for the `dflow` binary.
//!
//! One human-readable `fmt` layer, filtered by `RUST_LOG`, plus an
//! optional OpenTelemetry span bridge. The bridge ships spans through
//! the stdout exporter; a deployment that wants real trace collection
//! points an OTLP exporter here instead.

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// Held for the process lifetime so `shutdown_tracing` can flush it.
static PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Install the global subscriber. Fails if one is already set.
pub fn init_tracing(with_otel: bool) -> Result<(), Box<dyn std::error::Error>> {
    let otel_layer = with_otel.then(|| {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("dflow"));
        let _ = PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        layer
    });

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .with(otel_layer)
        .try_init()?;
    Ok(())
}

/// Flush buffered spans before exit. No-op when the bridge is off.
pub fn shutdown_tracing() {
    if let Some(provider) = PROVIDER.get()
        && let Err(err) = provider.shutdown()
    {
        eprintln!("otel shutdown: {err}");
    }
}
