//! Tracing subscriber setup
//!
//! Installs the global subscriber: an [`EnvFilter`] (`RUST_LOG` wins over the
//! configured level) and a JSON or human-readable fmt layer. With the `otel`
//! feature and an OTLP endpoint configured, spans are also exported.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for traces
    pub service_name: String,
    /// Default log level filter
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
    /// OTLP collector endpoint, only used with the `otel` feature
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            log_level: "info".to_string(),
            json_output: true,
            otlp_endpoint: None,
        }
    }
}

impl TelemetryConfig {
    /// Telemetry settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_level: config.log_level.clone(),
            json_output: config.json_logs,
            otlp_endpoint: Some(config.otlp_endpoint.clone()).filter(|e| !e.is_empty()),
            ..Self::default()
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(&self.log_level)?),
        }
    }
}

/// Installs the global tracing subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(config.filter()?);

    #[cfg(feature = "otel")]
    let registry = registry.with(otel::layer(config)?);

    if config.json_output {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    Ok(())
}

/// Flushes exported spans.
pub fn shutdown_telemetry() {
    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{Tracer, TracerProvider};
    use opentelemetry_sdk::{runtime, Resource};
    use tracing::Subscriber;
    use tracing_opentelemetry::OpenTelemetryLayer;
    use tracing_subscriber::registry::LookupSpan;

    use super::TelemetryConfig;

    pub(super) fn layer<S>(config: &TelemetryConfig) -> anyhow::Result<Option<OpenTelemetryLayer<S, Tracer>>>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let Some(endpoint) = &config.otlp_endpoint else {
            return Ok(None);
        };

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", config.service_name.clone()),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]))
            .build();

        let tracer = provider.tracer(config.service_name.clone());
        opentelemetry::global::set_tracer_provider(provider);

        Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
    }
}
