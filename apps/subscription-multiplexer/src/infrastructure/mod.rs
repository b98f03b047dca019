//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Broadcast channel adapter for reply delivery.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// Channel adapter towards the venue transport.
pub mod transport;
