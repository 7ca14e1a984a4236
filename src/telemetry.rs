//! Logging and OpenTelemetry tracing setup
//!
//! Log lines always go to stderr through the fmt layer. When
//! `[global.tracing]` is enabled, spans are additionally exported to an OTLP
//! collector (e.g., Jaeger, Tempo).

use anyhow::{Context, Result};
use config::TracingConfig;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{Sampler, TracerProvider as SdkTracerProvider},
    Resource,
};
use tracing::{info, Level};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Target of mutation audit records
pub const AUDIT_TARGET: &str = "audit";

/// Map a textual level to a tracing level, defaulting to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Global filter: `level` for everything except audit records, which are
/// kept at INFO and above whatever the configured level
fn log_filter(level: Level) -> Targets {
    Targets::new()
        .with_target(AUDIT_TARGET, LevelFilter::INFO)
        .with_default(LevelFilter::from_level(level))
}

/// Install the global subscriber.
///
/// Returns the tracer provider when OTLP export is enabled; keep it alive for
/// the duration of the program and hand it to [`shutdown_telemetry`] on exit.
pub fn init(level: Level, config: &TracingConfig) -> Result<Option<SdkTracerProvider>> {
    let provider = build_provider(config);

    let otel_layer = provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer("caddystate")));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(log_filter(level))
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .context("Failed to set tracing subscriber")?;

    if provider.is_some() {
        info!(endpoint = %config.otlp_endpoint, "OpenTelemetry tracing initialized");
    }

    Ok(provider)
}

fn build_provider(config: &TracingConfig) -> Option<SdkTracerProvider> {
    if !config.enabled {
        return None;
    }

    let sampler = if config.sampling_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if config.sampling_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(config.sampling_ratio)
    };

    let trace_config = opentelemetry_sdk::trace::Config::default()
        .with_sampler(sampler)
        .with_resource(Resource::new(vec![opentelemetry::KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]));

    match opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&config.otlp_endpoint),
        )
        .with_trace_config(trace_config)
        .install_batch(opentelemetry_sdk::runtime::Tokio)
    {
        Ok(provider) => Some(provider),
        Err(e) => {
            // The subscriber is not installed yet, so this cannot be logged
            eprintln!("Failed to create OTLP tracer provider: {}", e);
            None
        }
    }
}

/// Flush pending spans and shut the exporter down
pub fn shutdown_telemetry(provider: Option<SdkTracerProvider>) {
    if let Some(provider) = provider {
        info!("Shutting down OpenTelemetry tracing");
        if let Err(e) = provider.shutdown() {
            tracing::error!(error = %e, "Error shutting down tracer provider");
        }
    }
}
