//! Typed Event Stream
//!
//! The orchestration core communicates with its collaborators (UI,
//! logging, alert delivery) through a sum-typed event enum over a tokio
//! broadcast channel. Consumers subscribe explicitly; there are no
//! stringly-typed event names on the emitting side, while the serialized
//! form keeps the stable `{type, timestamp, ...}` shape.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::anomaly::AnomalyRecord;
use crate::domain::latency::LatencyAlert;
use crate::domain::provider::{InstrumentKey, ProviderId};
use crate::domain::subscription::FailoverReason;

// =============================================================================
// Event Types
// =============================================================================

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Event payloads emitted by the orchestration core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEventKind {
    /// A provider crossed into the unhealthy state.
    ProviderUnhealthy {
        /// Affected provider.
        provider: ProviderId,
        /// Violated thresholds, in display form.
        issues: Vec<String>,
    },
    /// A provider returned to the active state.
    ProviderRecovered {
        /// Affected provider.
        provider: ProviderId,
    },
    /// An instrument subscription finished connect + handshake.
    SymbolConnected {
        /// Bound provider.
        provider: ProviderId,
        /// Connected instrument.
        instrument: InstrumentKey,
    },
    /// A failover bound the instrument to a backup provider.
    FailoverSuccess {
        /// Affected instrument.
        instrument: InstrumentKey,
        /// Provider the binding left.
        from_provider: ProviderId,
        /// Provider the binding moved to.
        to_provider: ProviderId,
        /// What triggered the failover.
        reason: FailoverReason,
    },
    /// A failover exhausted all candidate providers.
    FailoverFailed {
        /// Affected instrument.
        instrument: InstrumentKey,
        /// Provider of the binding that failed.
        provider: ProviderId,
        /// Connect attempts made before giving up.
        attempts: u32,
    },
    /// A failover finished; duration folded into the rolling average.
    FailoverCompleted {
        /// Affected instrument.
        instrument: InstrumentKey,
        /// Provider now bound.
        provider: ProviderId,
        /// Wall-clock failover duration.
        duration_ms: u64,
        /// Whether the duration met the failover time budget.
        within_budget: bool,
    },
    /// A latency alert rule fired.
    LatencyAlert {
        /// The fired alert with its metric snapshot.
        alert: LatencyAlert,
    },
    /// An inbound sample was statistically anomalous.
    Anomaly {
        /// Provider the sample came from.
        provider: ProviderId,
        /// Detection result.
        record: AnomalyRecord,
    },
    /// A validated message was processed.
    MessageReceived {
        /// Provider the message came from.
        provider: ProviderId,
        /// Instrument the message was for.
        instrument: InstrumentKey,
        /// End-to-end latency of the message.
        latency_ms: f64,
    },
    /// A cost-optimization pass rebound an instrument.
    CostOptimization {
        /// Affected instrument.
        instrument: InstrumentKey,
        /// Provider the binding left.
        from_provider: ProviderId,
        /// Provider the binding moved to.
        to_provider: ProviderId,
        /// Projected daily savings in USD.
        projected_daily_savings: f64,
    },
}

impl FeedEventKind {
    /// Stable name of the event kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ProviderUnhealthy { .. } => "provider_unhealthy",
            Self::ProviderRecovered { .. } => "provider_recovered",
            Self::SymbolConnected { .. } => "symbol_connected",
            Self::FailoverSuccess { .. } => "failover_success",
            Self::FailoverFailed { .. } => "failover_failed",
            Self::FailoverCompleted { .. } => "failover_completed",
            Self::LatencyAlert { .. } => "latency_alert",
            Self::Anomaly { .. } => "anomaly",
            Self::MessageReceived { .. } => "message_received",
            Self::CostOptimization { .. } => "cost_optimization",
        }
    }
}

/// A timestamped event on the core's outbound stream.
#[derive(Debug, Clone, Serialize)]
pub struct FeedEvent {
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    #[serde(flatten)]
    pub kind: FeedEventKind,
}

impl FeedEvent {
    /// Stamp an event payload with the current time.
    #[must_use]
    pub fn now(kind: FeedEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast distribution of [`FeedEvent`]s to subscribed consumers.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    /// Subscribe to the event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the number of receivers that got the event, or `None` if
    /// there are no active subscribers (the event is still logged).
    pub fn emit(&self, kind: FeedEventKind) -> Option<usize> {
        tracing::debug!(event = kind.name(), "feed event");
        self.tx.send(FeedEvent::now(kind)).ok()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// =============================================================================
// Tests
// =============================================================================
