//! Infrastructure layer - Adapters and external integrations.

/// Authenticator adapters and the env-backed credential source.
pub mod auth;

/// Configuration loading.
pub mod config;

/// Status and metrics HTTP endpoint.
pub mod http;

/// Prometheus metrics recorder and event folding.
pub mod metrics;

/// Tracing and OpenTelemetry initialization.
pub mod telemetry;

/// Transport adapters.
pub mod transport;
