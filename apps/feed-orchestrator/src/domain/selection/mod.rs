//! Provider selection and scoring.
//!
//! Ranks candidate providers for an instrument class with a weighted
//! linear combination of normalized health and cost factors, and picks
//! the best (or next-best, during failover) provider.
//!
//! Selection is deterministic: ties are broken by provider registration
//! order, first registered wins.

use serde::Serialize;
use thiserror::Error;

use crate::domain::health::ProviderHealthSnapshot;
use crate::domain::provider::{InstrumentClass, Provider, ProviderId};

// ============================================================================
// Configuration
// ============================================================================

/// Weights for the scoring factors. Each factor is normalized to 0-100
/// before weighting.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    /// Weight of the rolling uptime percentage.
    pub uptime: f64,
    /// Weight of the current-latency score.
    pub latency: f64,
    /// Weight of the cost-per-message score.
    pub cost: f64,
    /// Weight of the error-rate score.
    pub error_rate: f64,
    /// Weight of the declared priority tier.
    pub priority: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            uptime: 0.30,
            latency: 0.25,
            cost: 0.20,
            error_rate: 0.15,
            priority: 0.10,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Selection failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// No active provider supports the requested instrument class.
    ///
    /// Fatal for the subscription attempt; surfaced, not retried here.
    #[error("no active provider available for {0}")]
    NoProviderAvailable(InstrumentClass),
}

// ============================================================================
// Score Breakdown
// ============================================================================

/// Per-factor score breakdown for one provider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderScore {
    /// Scored provider.
    pub provider_id: ProviderId,
    /// Weighted total.
    pub total: f64,
    /// Normalized uptime factor.
    pub uptime_score: f64,
    /// Normalized latency factor.
    pub latency_score: f64,
    /// Normalized cost factor.
    pub cost_score: f64,
    /// Normalized error-rate factor.
    pub error_score: f64,
    /// Priority tier factor.
    pub priority_score: f64,
}

// ============================================================================
// Selection Engine
// ============================================================================

/// Scores and ranks candidate providers for routing and failover.
#[derive(Debug, Clone, Default)]
pub struct SelectionEngine {
    weights: ScoringWeights,
}

impl SelectionEngine {
    /// Create an engine with custom weights.
    #[must_use]
    pub const fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Compute the weighted score for one provider.
    #[must_use]
    pub fn score(&self, provider: &Provider, health: &ProviderHealthSnapshot) -> ProviderScore {
        let uptime_score = health.uptime_pct.clamp(0.0, 100.0);
        let latency_score = (100.0 - health.current_latency_ms).max(0.0);
        let cost_score = (100.0 - provider.cost_per_message * 1000.0).max(0.0);
        let error_score = (100.0 - health.error_rate * 100.0).max(0.0);
        let priority_score = provider.priority.score();

        let total = uptime_score * self.weights.uptime
            + latency_score * self.weights.latency
            + cost_score * self.weights.cost
            + error_score * self.weights.error_rate
            + priority_score * self.weights.priority;

        ProviderScore {
            provider_id: provider.id.clone(),
            total,
            uptime_score,
            latency_score,
            cost_score,
            error_score,
            priority_score,
        }
    }

    /// Select the best provider for an instrument class.
    ///
    /// `candidates` must be in registration order; the first of any
    /// score-tied group wins.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoProviderAvailable`] when no active
    /// candidate supports the class.
    pub fn select_best<'a>(
        &self,
        class: InstrumentClass,
        candidates: &'a [(Provider, ProviderHealthSnapshot)],
    ) -> Result<&'a Provider, SelectionError> {
        self.pick(class, candidates, None)
            .ok_or(SelectionError::NoProviderAvailable(class))
    }

    /// Select the best provider excluding a failed one.
    ///
    /// Returns `None` when no other active candidate supports the class.
    #[must_use]
    pub fn select_backup<'a>(
        &self,
        class: InstrumentClass,
        exclude: &str,
        candidates: &'a [(Provider, ProviderHealthSnapshot)],
    ) -> Option<&'a Provider> {
        self.pick(class, candidates, Some(exclude))
    }

    /// Shared scan: highest score wins, strict comparison keeps the first
    /// registered provider on ties.
    fn pick<'a>(
        &self,
        class: InstrumentClass,
        candidates: &'a [(Provider, ProviderHealthSnapshot)],
        exclude: Option<&str>,
    ) -> Option<&'a Provider> {
        let mut best: Option<(&Provider, f64)> = None;

        for (provider, health) in candidates {
            if !provider.active || !provider.supports(class) {
                continue;
            }
            if exclude.is_some_and(|id| id == provider.id) {
                continue;
            }

            let score = self.score(provider, health).total;
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((provider, score)),
            }
        }

        best.map(|(provider, _)| provider)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::health::{HealthStatus, ProviderHealth};
    use crate::domain::provider::{AuthScheme, PriorityTier};
    use proptest::prelude::*;

    fn provider(id: &str, cost: f64, priority: PriorityTier) -> Provider {
        Provider {
            id: id.to_string(),
            name: id.to_string(),
            endpoint: format!("wss://{id}.example.com"),
            auth_scheme: AuthScheme::ApiKey,
            cost_per_message: cost,
            latency_baseline_ms: 20.0,
            priority,
            supported_instrument_classes: vec![InstrumentClass::StockQuotes],
            active: true,
        }
    }

    fn healthy_snapshot() -> ProviderHealthSnapshot {
        ProviderHealth::new().snapshot()
    }

    fn snapshot_with_latency(latency_ms: f64) -> ProviderHealthSnapshot {
        let mut health = ProviderHealth::new();
        health.record_latency(latency_ms);
        health.snapshot()
    }

    #[test]
    fn score_formula_on_fresh_health() {
        let engine = SelectionEngine::default();
        let p = provider("alpha", 0.0001, PriorityTier::High);
        let score = engine.score(&p, &healthy_snapshot());

        assert_eq!(score.uptime_score, 100.0);
        assert_eq!(score.latency_score, 100.0);
        // 100 - 0.0001 * 1000 = 99.9
        assert!((score.cost_score - 99.9).abs() < 1e-9);
        assert_eq!(score.error_score, 100.0);
        assert_eq!(score.priority_score, 90.0);

        let expected =
            100.0 * 0.30 + 100.0 * 0.25 + 99.9 * 0.20 + 100.0 * 0.15 + 90.0 * 0.10;
        assert!((score.total - expected).abs() < 1e-9);
    }

    #[test]
    fn latency_score_floors_at_zero() {
        let engine = SelectionEngine::default();
        let p = provider("alpha", 0.0001, PriorityTier::High);
        let score = engine.score(&p, &snapshot_with_latency(250.0));

        assert_eq!(score.latency_score, 0.0);
    }

    #[test]
    fn select_best_prefers_higher_score() {
        let engine = SelectionEngine::default();
        let candidates = vec![
            (provider("cheap", 0.0001, PriorityTier::Low), healthy_snapshot()),
            (provider("premium", 0.0001, PriorityTier::High), healthy_snapshot()),
        ];

        let best = engine
            .select_best(InstrumentClass::StockQuotes, &candidates)
            .unwrap();
        assert_eq!(best.id, "premium");
    }

    #[test]
    fn tie_broken_by_registration_order() {
        let engine = SelectionEngine::default();
        let candidates = vec![
            (provider("first", 0.0001, PriorityTier::Medium), healthy_snapshot()),
            (provider("second", 0.0001, PriorityTier::Medium), healthy_snapshot()),
        ];

        // Identical scores: first registered wins, repeatably.
        for _ in 0..10 {
            let best = engine
                .select_best(InstrumentClass::StockQuotes, &candidates)
                .unwrap();
            assert_eq!(best.id, "first");
        }
    }

    #[test]
    fn inactive_providers_skipped() {
        let engine = SelectionEngine::default();
        let mut inactive = provider("first", 0.0001, PriorityTier::High);
        inactive.active = false;
        let candidates = vec![
            (inactive, healthy_snapshot()),
            (provider("second", 0.0001, PriorityTier::Low), healthy_snapshot()),
        ];

        let best = engine
            .select_best(InstrumentClass::StockQuotes, &candidates)
            .unwrap();
        assert_eq!(best.id, "second");
    }

    #[test]
    fn unsupported_class_yields_no_provider() {
        let engine = SelectionEngine::default();
        let candidates = vec![(
            provider("alpha", 0.0001, PriorityTier::High),
            healthy_snapshot(),
        )];

        let result = engine.select_best(InstrumentClass::OptionsData, &candidates);
        assert_eq!(
            result.unwrap_err(),
            SelectionError::NoProviderAvailable(InstrumentClass::OptionsData)
        );
    }

    #[test]
    fn backup_excludes_failed_provider() {
        let engine = SelectionEngine::default();
        let candidates = vec![
            (provider("primary", 0.0001, PriorityTier::High), healthy_snapshot()),
            (provider("backup", 0.0001, PriorityTier::Medium), healthy_snapshot()),
        ];

        let backup = engine
            .select_backup(InstrumentClass::StockQuotes, "primary", &candidates)
            .unwrap();
        assert_eq!(backup.id, "backup");
    }

    #[test]
    fn backup_none_when_only_failed_provider_remains() {
        let engine = SelectionEngine::default();
        let candidates = vec![(
            provider("primary", 0.0001, PriorityTier::High),
            healthy_snapshot(),
        )];

        let backup = engine.select_backup(InstrumentClass::StockQuotes, "primary", &candidates);
        assert!(backup.is_none());
    }

    #[test]
    fn degraded_health_lowers_rank() {
        let engine = SelectionEngine::default();

        let mut degraded = ProviderHealth::new();
        for _ in 0..5 {
            degraded.record_error();
        }
        degraded.record_latency(90.0);
        assert_eq!(degraded.snapshot().status, HealthStatus::Active);

        let candidates = vec![
            (provider("degraded", 0.0001, PriorityTier::High), degraded.snapshot()),
            (provider("steady", 0.0001, PriorityTier::Medium), healthy_snapshot()),
        ];

        let best = engine
            .select_best(InstrumentClass::StockQuotes, &candidates)
            .unwrap();
        assert_eq!(best.id, "steady");
    }

    proptest! {
        #[test]
        fn total_score_bounded(
            uptime in 0.0f64..=100.0,
            latency in 0.0f64..=500.0,
            cost in 0.0f64..=1.0,
            errors in 0u64..=100,
            messages in 0u64..=1000,
        ) {
            let engine = SelectionEngine::default();
            let p = provider("alpha", cost, PriorityTier::High);

            let mut health = ProviderHealth::new();
            for _ in 0..messages {
                health.record_success();
            }
            for _ in 0..errors {
                health.record_error();
            }
            health.record_latency(latency);
            let mut snapshot = health.snapshot();
            snapshot.uptime_pct = uptime;

            let score = engine.score(&p, &snapshot);
            prop_assert!(score.total >= 0.0);
            prop_assert!(score.total <= 100.0);
        }
    }
}
