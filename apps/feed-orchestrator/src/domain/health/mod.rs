//! Provider health tracking.
//!
//! Maintains the mutable per-provider health record: rolling uptime,
//! latency, error rate, throughput, and the hysteretic
//! `Active ⇄ Unhealthy` status machine.
//!
//! Status transitions are edge-triggered: a provider becomes `Unhealthy`
//! when any one threshold is violated and returns to `Active` only once
//! all thresholds clear. Evaluation is idempotent; callers emit events
//! only when a transition is returned.

use std::time::Instant;

use serde::Serialize;

// ============================================================================
// Configuration
// ============================================================================

/// Thresholds guarding the `Active ⇄ Unhealthy` transition.
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Minimum acceptable rolling uptime percentage (default: 95%).
    pub min_uptime_pct: f64,
    /// Maximum acceptable current latency (default: 100ms).
    pub max_latency_ms: f64,
    /// Maximum acceptable error rate (default: 0.10).
    pub max_error_rate: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_uptime_pct: 95.0,
            max_latency_ms: 100.0,
            max_error_rate: 0.10,
        }
    }
}

/// Uptime penalty applied per consecutive error at evaluation time.
const UPTIME_PENALTY_PER_ERROR: f64 = 5.0;

// ============================================================================
// Status Types
// ============================================================================

/// Operational status of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Provider is eligible for routing.
    #[default]
    Active,
    /// One or more thresholds are violated.
    Unhealthy,
}

/// A specific threshold violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIssue {
    /// Rolling uptime below the configured floor.
    LowUptime,
    /// Current latency above the configured ceiling.
    HighLatency,
    /// Error rate above the configured ceiling.
    HighErrorRate,
}

impl std::fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowUptime => write!(f, "low_uptime"),
            Self::HighLatency => write!(f, "high_latency"),
            Self::HighErrorRate => write!(f, "high_error_rate"),
        }
    }
}

/// Status transition produced by an evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthTransition {
    /// Provider crossed from `Active` to `Unhealthy`.
    BecameUnhealthy(Vec<HealthIssue>),
    /// Provider crossed from `Unhealthy` back to `Active`.
    Recovered,
}

// ============================================================================
// Health Record
// ============================================================================

/// Mutable health record for a single provider.
#[derive(Debug)]
pub struct ProviderHealth {
    /// Rolling uptime percentage, recomputed on each tick.
    uptime_pct: f64,
    /// Latency of the most recent sample or probe.
    current_latency_ms: f64,
    /// Running average latency.
    avg_latency_ms: f64,
    /// Count of latency samples folded into the average.
    latency_samples: u64,
    /// Total successful messages.
    messages: u64,
    /// Total errors (transport + validation).
    errors: u64,
    /// Errors since the last success.
    consecutive_errors: u32,
    /// Throughput over the last completed tick window.
    messages_per_second: f64,
    /// Messages received in the current tick window.
    window_count: u64,
    /// Start of the current tick window.
    window_start: Instant,
    /// Time of the last health-check tick.
    last_check: Option<Instant>,
    /// Current operational status.
    status: HealthStatus,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderHealth {
    /// Create a fresh health record.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uptime_pct: 100.0,
            current_latency_ms: 0.0,
            avg_latency_ms: 0.0,
            latency_samples: 0,
            messages: 0,
            errors: 0,
            consecutive_errors: 0,
            messages_per_second: 0.0,
            window_count: 0,
            window_start: Instant::now(),
            last_check: None,
            status: HealthStatus::Active,
        }
    }

    /// Record a successfully processed message.
    pub fn record_success(&mut self) {
        self.messages += 1;
        self.window_count += 1;
        self.consecutive_errors = 0;
    }

    /// Record an error attributed to this provider.
    pub fn record_error(&mut self) {
        self.errors += 1;
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
    }

    /// Record an observed latency sample in milliseconds.
    pub fn record_latency(&mut self, latency_ms: f64) {
        self.current_latency_ms = latency_ms;
        self.latency_samples += 1;
        let n = self.latency_samples as f64;
        self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / n;
    }

    /// Run a health-check tick.
    ///
    /// Recomputes uptime from the consecutive-error count, folds in the
    /// probe latency, closes the throughput window, and evaluates the
    /// status machine. Returns the transition, if one occurred.
    pub fn tick(
        &mut self,
        probe_latency_ms: Option<f64>,
        thresholds: &HealthThresholds,
    ) -> Option<HealthTransition> {
        let now = Instant::now();

        self.uptime_pct =
            (100.0 - UPTIME_PENALTY_PER_ERROR * f64::from(self.consecutive_errors)).max(0.0);

        if let Some(latency) = probe_latency_ms {
            self.record_latency(latency);
        }

        let elapsed = now.duration_since(self.window_start).as_secs_f64();
        if elapsed > 0.0 {
            self.messages_per_second = self.window_count as f64 / elapsed;
        }
        self.window_count = 0;
        self.window_start = now;
        self.last_check = Some(now);

        self.evaluate(thresholds)
    }

    /// Evaluate the status machine against the thresholds.
    ///
    /// Idempotent: repeated calls with unchanged metrics return `None`
    /// after the first transition.
    pub fn evaluate(&mut self, thresholds: &HealthThresholds) -> Option<HealthTransition> {
        let issues = self.violations(thresholds);

        match (self.status, issues.is_empty()) {
            (HealthStatus::Active, false) => {
                self.status = HealthStatus::Unhealthy;
                Some(HealthTransition::BecameUnhealthy(issues))
            }
            (HealthStatus::Unhealthy, true) => {
                self.status = HealthStatus::Active;
                Some(HealthTransition::Recovered)
            }
            _ => None,
        }
    }

    /// List currently violated thresholds.
    #[must_use]
    pub fn violations(&self, thresholds: &HealthThresholds) -> Vec<HealthIssue> {
        let mut issues = Vec::new();

        if self.uptime_pct < thresholds.min_uptime_pct {
            issues.push(HealthIssue::LowUptime);
        }
        if self.current_latency_ms > thresholds.max_latency_ms {
            issues.push(HealthIssue::HighLatency);
        }
        if self.error_rate() > thresholds.max_error_rate {
            issues.push(HealthIssue::HighErrorRate);
        }

        issues
    }

    /// Error rate over the record's lifetime: errors / (messages + errors).
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        let total = self.messages + self.errors;
        if total == 0 {
            0.0
        } else {
            self.errors as f64 / total as f64
        }
    }

    /// Current operational status.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// Rolling uptime percentage.
    #[must_use]
    pub const fn uptime_pct(&self) -> f64 {
        self.uptime_pct
    }

    /// Latency of the most recent sample.
    #[must_use]
    pub const fn current_latency_ms(&self) -> f64 {
        self.current_latency_ms
    }

    /// Throughput over the last completed window.
    #[must_use]
    pub const fn messages_per_second(&self) -> f64 {
        self.messages_per_second
    }

    /// Errors since the last success.
    #[must_use]
    pub const fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Get a serializable snapshot of the record.
    #[must_use]
    pub fn snapshot(&self) -> ProviderHealthSnapshot {
        ProviderHealthSnapshot {
            status: self.status,
            uptime_pct: self.uptime_pct,
            current_latency_ms: self.current_latency_ms,
            avg_latency_ms: self.avg_latency_ms,
            error_rate: self.error_rate(),
            messages: self.messages,
            errors: self.errors,
            consecutive_errors: self.consecutive_errors,
            messages_per_second: self.messages_per_second,
        }
    }
}

/// Serializable snapshot of a provider health record.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthSnapshot {
    /// Operational status.
    pub status: HealthStatus,
    /// Rolling uptime percentage.
    pub uptime_pct: f64,
    /// Latency of the most recent sample.
    pub current_latency_ms: f64,
    /// Running average latency.
    pub avg_latency_ms: f64,
    /// Errors / (messages + errors).
    pub error_rate: f64,
    /// Total successful messages.
    pub messages: u64,
    /// Total errors.
    pub errors: u64,
    /// Errors since the last success.
    pub consecutive_errors: u32,
    /// Throughput over the last completed window.
    pub messages_per_second: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_is_active() {
        let health = ProviderHealth::new();
        assert_eq!(health.status(), HealthStatus::Active);
        assert_eq!(health.uptime_pct(), 100.0);
        assert_eq!(health.error_rate(), 0.0);
    }

    #[test]
    fn error_rate_counts_both_sides() {
        let mut health = ProviderHealth::new();
        for _ in 0..9 {
            health.record_success();
        }
        health.record_error();

        assert!((health.error_rate() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn consecutive_errors_reset_on_success() {
        let mut health = ProviderHealth::new();
        health.record_error();
        health.record_error();
        assert_eq!(health.consecutive_errors(), 2);

        health.record_success();
        assert_eq!(health.consecutive_errors(), 0);
    }

    #[test]
    fn becomes_unhealthy_on_latency_violation() {
        let mut health = ProviderHealth::new();
        health.record_latency(150.0);

        let transition = health.evaluate(&HealthThresholds::default());
        assert!(matches!(
            transition,
            Some(HealthTransition::BecameUnhealthy(ref issues))
                if issues == &[HealthIssue::HighLatency]
        ));
        assert_eq!(health.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn transition_fires_once_not_per_tick() {
        let mut health = ProviderHealth::new();
        let thresholds = HealthThresholds::default();

        // Three consecutive ticks at 120ms against a 100ms ceiling.
        let first = health.tick(Some(120.0), &thresholds);
        let second = health.tick(Some(120.0), &thresholds);
        let third = health.tick(Some(120.0), &thresholds);

        assert!(matches!(first, Some(HealthTransition::BecameUnhealthy(_))));
        assert!(second.is_none());
        assert!(third.is_none());

        // Latency drops back under the ceiling: single recovery edge.
        let recovered = health.tick(Some(40.0), &thresholds);
        assert_eq!(recovered, Some(HealthTransition::Recovered));
        assert!(health.tick(Some(40.0), &thresholds).is_none());
    }

    #[test]
    fn no_partial_recovery() {
        let mut health = ProviderHealth::new();
        let thresholds = HealthThresholds::default();

        // Violate both latency and error rate.
        health.record_latency(200.0);
        for _ in 0..5 {
            health.record_error();
        }
        assert!(matches!(
            health.evaluate(&thresholds),
            Some(HealthTransition::BecameUnhealthy(_))
        ));

        // Clearing latency alone is not enough: uptime is still degraded
        // by consecutive errors and the error rate remains elevated.
        health.record_latency(10.0);
        let violations = health.violations(&thresholds);
        assert!(violations.contains(&HealthIssue::HighErrorRate));
        assert!(health.evaluate(&thresholds).is_none());
        assert_eq!(health.status(), HealthStatus::Unhealthy);

        // Flood of successes clears error rate and consecutive errors.
        for _ in 0..200 {
            health.record_success();
        }
        let transition = health.tick(Some(10.0), &thresholds);
        assert_eq!(transition, Some(HealthTransition::Recovered));
    }

    #[test]
    fn uptime_recomputed_from_consecutive_errors() {
        let mut health = ProviderHealth::new();
        let thresholds = HealthThresholds::default();

        for _ in 0..4 {
            health.record_error();
        }
        let _ = health.tick(None, &thresholds);

        // 100 - 4 * 5 = 80%
        assert!((health.uptime_pct() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn uptime_floor_is_zero() {
        let mut health = ProviderHealth::new();
        for _ in 0..50 {
            health.record_error();
        }
        let _ = health.tick(None, &HealthThresholds::default());
        assert_eq!(health.uptime_pct(), 0.0);
    }

    #[test]
    fn running_average_latency() {
        let mut health = ProviderHealth::new();
        health.record_latency(10.0);
        health.record_latency(20.0);
        health.record_latency(30.0);

        let snapshot = health.snapshot();
        assert!((snapshot.avg_latency_ms - 20.0).abs() < 1e-9);
        assert_eq!(snapshot.current_latency_ms, 30.0);
    }

    #[test]
    fn health_issue_display() {
        assert_eq!(HealthIssue::LowUptime.to_string(), "low_uptime");
        assert_eq!(HealthIssue::HighLatency.to_string(), "high_latency");
        assert_eq!(HealthIssue::HighErrorRate.to_string(), "high_error_rate");
    }
}
