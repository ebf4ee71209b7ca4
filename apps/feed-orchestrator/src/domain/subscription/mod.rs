//! Subscription Binding Types
//!
//! Domain types tracking the binding of one instrument to one provider.
//! At most one live binding owns a given instrument key at any instant; a
//! failover tears the old binding down before establishing the new one.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::provider::{InstrumentClass, InstrumentKey, ProviderId};

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a subscription's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPhase {
    /// No binding requested or binding torn down.
    #[default]
    Unsubscribed,
    /// Transport open / auth handshake in progress.
    Connecting,
    /// Receiving data from the bound provider.
    Connected,
    /// Bound but stale, slow, or erroring; failover pending.
    Degraded,
    /// Tearing down the old binding and connecting a backup.
    FailingOver,
}

impl SubscriptionPhase {
    /// Get the phase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::FailingOver => "failing_over",
        }
    }

    /// Check whether data is currently flowing.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Degraded)
    }
}

impl std::fmt::Display for SubscriptionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Reasons
// =============================================================================

/// Why a subscription degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// No message inside the staleness window.
    Stale,
    /// Bound provider's latency crossed its ceiling.
    HighLatency,
    /// Bound provider's error rate crossed its ceiling.
    HighErrorRate,
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stale => write!(f, "stale"),
            Self::HighLatency => write!(f, "high_latency"),
            Self::HighErrorRate => write!(f, "high_error_rate"),
        }
    }
}

/// What triggered a failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverReason {
    /// Transport open or auth handshake failed during connect.
    ConnectFailure,
    /// Health check found the binding degraded.
    Degraded,
    /// A cheaper, equally healthy provider is available.
    CostOptimization,
}

impl std::fmt::Display for FailoverReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectFailure => write!(f, "connect_failure"),
            Self::Degraded => write!(f, "degraded"),
            Self::CostOptimization => write!(f, "cost_optimization"),
        }
    }
}

// =============================================================================
// Binding Record
// =============================================================================

/// The live binding of one instrument to one provider.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Instrument key.
    pub instrument: InstrumentKey,
    /// Instrument class (for SLA lookup).
    pub class: InstrumentClass,
    /// Currently bound provider.
    pub provider_id: ProviderId,
    /// Binding creation time.
    pub created_at: DateTime<Utc>,
    /// Messages received over the binding's lifetime.
    pub messages_received: u64,
    /// Receipt time of the most recent message.
    pub last_message_at: Option<Instant>,
    /// Completed failovers for this instrument.
    pub failover_count: u32,
    /// Current lifecycle phase.
    pub phase: SubscriptionPhase,
}

impl Subscription {
    /// Create a binding in the `Connecting` phase.
    #[must_use]
    pub fn connecting(instrument: &str, class: InstrumentClass, provider_id: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            class,
            provider_id: provider_id.to_string(),
            created_at: Utc::now(),
            messages_received: 0,
            last_message_at: None,
            failover_count: 0,
            phase: SubscriptionPhase::Connecting,
        }
    }

    /// Record one received message.
    pub fn record_message(&mut self) {
        self.messages_received += 1;
        self.last_message_at = Some(Instant::now());
    }

    /// Check staleness against the given window.
    ///
    /// A binding that has never received a message is judged from its
    /// creation-side connect, so `None` counts as stale only after the
    /// window has fully elapsed since the phase became `Connected`.
    #[must_use]
    pub fn is_stale(&self, window: Duration, connected_since: Instant) -> bool {
        match self.last_message_at {
            Some(last) => last.elapsed() > window,
            None => connected_since.elapsed() > window,
        }
    }

    /// Rebind to a new provider after a completed failover.
    pub fn rebind(&mut self, provider_id: &str) {
        self.provider_id = provider_id.to_string();
        self.failover_count += 1;
        self.last_message_at = None;
        self.phase = SubscriptionPhase::Connected;
    }

    /// Get a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            instrument: self.instrument.clone(),
            class: self.class,
            provider_id: self.provider_id.clone(),
            phase: self.phase,
            created_at: self.created_at,
            messages_received: self.messages_received,
            last_message_age_ms: self.last_message_at.map(|t| t.elapsed().as_millis() as u64),
            failover_count: self.failover_count,
        }
    }
}

/// Serializable snapshot of a subscription binding.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnapshot {
    /// Instrument key.
    pub instrument: InstrumentKey,
    /// Instrument class.
    pub class: InstrumentClass,
    /// Bound provider.
    pub provider_id: ProviderId,
    /// Lifecycle phase.
    pub phase: SubscriptionPhase,
    /// Binding creation time.
    pub created_at: DateTime<Utc>,
    /// Messages received.
    pub messages_received: u64,
    /// Milliseconds since the last message, if any was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_age_ms: Option<u64>,
    /// Completed failovers.
    pub failover_count: u32,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::InstrumentClass;

    #[test]
    fn phase_predicates() {
        assert!(SubscriptionPhase::Connected.is_connected());
        assert!(SubscriptionPhase::Degraded.is_connected());
        assert!(!SubscriptionPhase::Connecting.is_connected());
        assert!(!SubscriptionPhase::Unsubscribed.is_connected());
    }

    #[test]
    fn new_binding_starts_connecting() {
        let sub = Subscription::connecting("AAPL", InstrumentClass::StockQuotes, "alpha");
        assert_eq!(sub.phase, SubscriptionPhase::Connecting);
        assert_eq!(sub.messages_received, 0);
        assert_eq!(sub.failover_count, 0);
    }

    #[test]
    fn record_message_updates_counters() {
        let mut sub = Subscription::connecting("AAPL", InstrumentClass::StockQuotes, "alpha");
        sub.record_message();
        sub.record_message();

        assert_eq!(sub.messages_received, 2);
        assert!(sub.last_message_at.is_some());
    }

    #[test]
    fn staleness_with_recent_message() {
        let mut sub = Subscription::connecting("AAPL", InstrumentClass::StockQuotes, "alpha");
        sub.record_message();

        assert!(!sub.is_stale(Duration::from_secs(30), Instant::now()));
    }

    #[test]
    fn staleness_without_any_message() {
        let sub = Subscription::connecting("AAPL", InstrumentClass::StockQuotes, "alpha");
        let connected_long_ago = Instant::now() - Duration::from_secs(60);

        assert!(sub.is_stale(Duration::from_secs(30), connected_long_ago));
        assert!(!sub.is_stale(Duration::from_secs(30), Instant::now()));
    }

    #[test]
    fn rebind_increments_failover_count() {
        let mut sub = Subscription::connecting("AAPL", InstrumentClass::StockQuotes, "alpha");
        sub.record_message();

        sub.rebind("beta");

        assert_eq!(sub.provider_id, "beta");
        assert_eq!(sub.failover_count, 1);
        assert_eq!(sub.phase, SubscriptionPhase::Connected);
        assert!(sub.last_message_at.is_none());
    }

    #[test]
    fn snapshot_carries_phase_and_counts() {
        let mut sub = Subscription::connecting("AAPL", InstrumentClass::StockQuotes, "alpha");
        sub.phase = SubscriptionPhase::Connected;
        sub.record_message();

        let snapshot = sub.snapshot();
        assert_eq!(snapshot.instrument, "AAPL");
        assert_eq!(snapshot.provider_id, "alpha");
        assert_eq!(snapshot.phase, SubscriptionPhase::Connected);
        assert_eq!(snapshot.messages_received, 1);
        assert!(snapshot.last_message_age_ms.is_some());
    }

    #[test]
    fn reason_display() {
        assert_eq!(FailoverReason::CostOptimization.to_string(), "cost_optimization");
        assert_eq!(DegradeReason::Stale.to_string(), "stale");
    }
}
