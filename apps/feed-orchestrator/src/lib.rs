#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Feed Orchestrator - Market Data Connection Core
//!
//! Maintains concurrent long-lived connections to multiple upstream
//! market data providers, scores them on a weighted multi-factor basis
//! for routing decisions, validates inbound data for statistical
//! anomalies, tracks per-(provider, instrument) latency against SLA
//! targets, and fails subscriptions over to backup providers within a
//! bounded time budget.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure orchestration logic
//!   - `provider`: Provider descriptors, priority tiers, instrument classes
//!   - `health`: Hysteretic provider health status machine
//!   - `anomaly`: Rolling-history price/volume anomaly detection
//!   - `latency`: Latency percentiles and alert rules
//!   - `selection`: Weighted provider scoring
//!   - `subscription`: Instrument binding state
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport, authenticator, and credential contracts
//!   - `events`: Typed event stream for external collaborators
//!   - `services`: Provider registry, connection pool, failover orchestrator
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `transport`: WebSocket transport factory
//!   - `auth`: Per-scheme authenticator adapters
//!   - `config`: Environment settings and provider documents
//!   - `http`: Status and metrics HTTP endpoint
//!   - `telemetry` / `metrics`: Tracing and Prometheus integration
//!
//! # Data Flow
//!
//! ```text
//! Provider A WS ──┐
//!                 │   ┌────────────┐   ┌───────────────┐
//! Provider B WS ──┼──►│ Validation │──►│ Anomaly check │──┐
//!                 │   └────────────┘   │ Latency record│  │
//! Provider C WS ──┘                    └───────────────┘  │
//!        ▲                                                ▼
//!        │        ┌──────────────┐   ┌──────────┐   ┌───────────┐
//!        └────────│   Failover   │◄──│ Registry │◄──│  Events   │──► consumers
//!                 │ Orchestrator │   │  health  │   └───────────┘
//!                 └──────────────┘   └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core orchestration logic with no I/O dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::anomaly::{AnomalyConfig, AnomalyDetector, AnomalyRecord, AnomalySeverity};
pub use domain::health::{HealthStatus, HealthThresholds, ProviderHealth, ProviderHealthSnapshot};
pub use domain::latency::{
    AlertRuleKind, AlertSeverity, LatencyAlert, LatencyMonitor, LatencyMonitorConfig, SlaTable,
    SlaThresholds,
};
pub use domain::provider::{
    AuthScheme, InstrumentClass, InstrumentKey, PriorityTier, Provider, ProviderId,
};
pub use domain::selection::{SelectionEngine, SelectionError};
pub use domain::streaming::{TickMessage, ValidationError};
pub use domain::subscription::{FailoverReason, SubscriptionPhase};

// Application surface
pub use application::events::{EventBus, FeedEvent, FeedEventKind};
pub use application::ports::{
    AuthError, Authenticator, Credential, CredentialSource, Transport, TransportError,
    TransportFactory,
};
pub use application::services::backoff::{BackoffConfig, BackoffPolicy};
pub use application::services::orchestrator::{
    CostOptimizationSettings, FeedOrchestrator, OrchestratorConfig, OrchestratorError,
    OrchestratorSnapshot,
};
pub use application::services::pool::{ConnectionPool, PoolStats};
pub use application::services::registry::{ProviderRegistry, RegistryError};

// Infrastructure config
pub use infrastructure::config::{ConfigError, OrchestratorSettings, ProvidersDocument};

// Status server
pub use infrastructure::http::{StatusServer, StatusServerError, StatusServerState};

// Metrics
pub use infrastructure::metrics::{init_metrics, record_event};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
