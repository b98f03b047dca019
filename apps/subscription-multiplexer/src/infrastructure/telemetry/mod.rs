//! OpenTelemetry Tracing Integration
//!
//! Installs the process-wide `tracing` subscriber: an `EnvFilter`, a fmt
//! layer and, unless disabled, an OTLP span exporter so multiplexer decisions
//! show up next to the transport's own traces.
//!
//! # Environment Variables
//!
//! - `OTEL_ENABLED`: Set to "false" to disable the OTLP exporter (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: http://localhost:4318)
//! - `OTEL_SERVICE_NAME`: Service name for traces (default: subscription-multiplexer)
//! - `RUST_LOG`: Extra filter directives on top of `subscription_multiplexer=info`
//!
//! # Usage
//!
//! ```ignore
//! use subscription_multiplexer::infrastructure::telemetry;
//!
//! // Keep the guard alive for the lifetime of the process
//! let _guard = telemetry::init()?;
//! tracing::info!("Multiplexer ready");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

const DEFAULT_SERVICE_NAME: &str = "subscription-multiplexer";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";

/// Directives applied on top of `RUST_LOG`.
const BASE_DIRECTIVES: &[&str] = &["subscription_multiplexer=info", "opentelemetry=warn"];

/// Telemetry setup failure.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The OTLP exporter could not be built.
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(String),
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Shuts the tracer provider down (flushing pending spans) when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    #[must_use]
    pub const fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown OpenTelemetry tracer provider: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Export spans over OTLP.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name attached to exported spans.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Blank values fall back to the defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            enabled: value("OTEL_ENABLED").is_none_or(|v| !v.trim().eq_ignore_ascii_case("false")),
            otlp_endpoint: value("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or(defaults.otlp_endpoint),
            service_name: value("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
        }
    }
}

/// Initialize telemetry from the environment.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a subscriber is
/// already installed.
pub fn init() -> Result<TelemetryGuard, TelemetryError> {
    init_with_config(TelemetryConfig::from_env())
}

/// Initialize telemetry with an explicit configuration.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a subscriber is
/// already installed.
pub fn init_with_config(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer)
            .try_init()?;

        return Ok(TelemetryGuard {
            tracer_provider: None,
        });
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build();

    let tracer = tracer_provider.tracer(config.service_name);
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(TelemetryGuard {
        tracer_provider: Some(tracer_provider),
    })
}

fn env_filter() -> EnvFilter {
    base_directives().fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}

fn base_directives() -> impl Iterator<Item = Directive> {
    BASE_DIRECTIVES
        .iter()
        .filter_map(|raw| match raw.parse::<Directive>() {
            Ok(directive) => Some(directive),
            Err(e) => {
                eprintln!("Ignoring invalid filter directive {raw:?}: {e}");
                None
            }
        })
}

// =============================================================================
// Tests
// =============================================================================
