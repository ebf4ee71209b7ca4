//! Latency monitoring and alerting.
//!
//! Records per-(provider, instrument) latency samples into bounded ring
//! buffers, maintains rolling percentiles, and evaluates alert rules
//! against every updated snapshot. Rules are evaluated in registration
//! order and independently (no short-circuiting); each firing is subject
//! to a per-(rule, provider, instrument) cooldown. A suppressed firing is
//! counted and logged, never silently dropped.
//!
//! Thresholds are parameterized per instrument class through the SLA
//! table, not hardcoded per instrument.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::provider::{InstrumentClass, InstrumentKey, ProviderId};

// ============================================================================
// Constants
// ============================================================================

/// Ring buffer capacity, sized by the degradation-trend window.
const RING_CAPACITY: usize = 300;

/// Window for rolling average and percentile computation.
const PERCENTILE_WINDOW: usize = 100;

/// Window for the spike rule's short-term average.
const SPIKE_WINDOW: usize = 10;

/// Minimum prior samples before the spike rule runs.
const SPIKE_MIN_SAMPLES: usize = 5;

/// Window for the SLA-violation rule.
const SLA_WINDOW: usize = 60;

/// Minimum samples before the SLA-violation rule runs.
const SLA_MIN_SAMPLES: usize = 30;

/// Fraction of samples over the warning threshold that fires the SLA rule.
const SLA_VIOLATION_FRACTION: f64 = 0.10;

/// Minimum samples before the degradation-trend rule runs.
const TREND_MIN_SAMPLES: usize = 100;

/// Regression slope (ms per sample) that fires the trend rule.
const TREND_SLOPE_THRESHOLD: f64 = 1.0;

// ============================================================================
// SLA Table
// ============================================================================

/// Latency thresholds for one instrument class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaThresholds {
    /// Target latency in milliseconds.
    pub target_ms: f64,
    /// Warning threshold in milliseconds.
    pub warning_ms: f64,
    /// Critical threshold in milliseconds.
    pub critical_ms: f64,
}

impl Default for SlaThresholds {
    fn default() -> Self {
        Self {
            target_ms: 50.0,
            warning_ms: 75.0,
            critical_ms: 100.0,
        }
    }
}

/// Latency SLA table keyed by instrument class.
#[derive(Debug, Clone)]
pub struct SlaTable {
    entries: HashMap<InstrumentClass, SlaThresholds>,
}

impl Default for SlaTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            InstrumentClass::StockQuotes,
            SlaThresholds {
                target_ms: 50.0,
                warning_ms: 75.0,
                critical_ms: 100.0,
            },
        );
        entries.insert(
            InstrumentClass::OptionsData,
            SlaThresholds {
                target_ms: 100.0,
                warning_ms: 150.0,
                critical_ms: 200.0,
            },
        );
        entries.insert(
            InstrumentClass::FuturesData,
            SlaThresholds {
                target_ms: 75.0,
                warning_ms: 110.0,
                critical_ms: 150.0,
            },
        );
        entries.insert(
            InstrumentClass::FxQuotes,
            SlaThresholds {
                target_ms: 40.0,
                warning_ms: 60.0,
                critical_ms: 80.0,
            },
        );
        Self { entries }
    }
}

impl SlaTable {
    /// Create a table from explicit entries.
    #[must_use]
    pub fn new(entries: HashMap<InstrumentClass, SlaThresholds>) -> Self {
        Self { entries }
    }

    /// Thresholds for a class, falling back to the default triple.
    #[must_use]
    pub fn thresholds(&self, class: InstrumentClass) -> SlaThresholds {
        self.entries.get(&class).copied().unwrap_or_default()
    }

    /// Insert or replace an entry.
    pub fn set(&mut self, class: InstrumentClass, thresholds: SlaThresholds) {
        self.entries.insert(class, thresholds);
    }
}

// ============================================================================
// Alert Types
// ============================================================================

/// Registered alert rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRuleKind {
    /// Current sample above the critical threshold.
    HighLatency,
    /// Current sample more than double the short-term average.
    Spike,
    /// Too many recent samples above the warning threshold.
    SlaViolation,
    /// Regression slope shows steady degradation.
    DegradationTrend,
}

impl AlertRuleKind {
    /// All rules in evaluation order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::HighLatency,
            Self::Spike,
            Self::SlaViolation,
            Self::DegradationTrend,
        ]
    }

    /// Get the rule name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HighLatency => "high_latency",
            Self::Spike => "latency_spike",
            Self::SlaViolation => "sla_violation",
            Self::DegradationTrend => "degradation_trend",
        }
    }
}

impl std::fmt::Display for AlertRuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity attached to a fired alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// SLA breach.
    Error,
}

/// An immutable latency alert.
#[derive(Debug, Clone, Serialize)]
pub struct LatencyAlert {
    /// Rule that fired.
    pub rule: AlertRuleKind,
    /// Alert severity.
    pub severity: AlertSeverity,
    /// Provider the sample came from.
    pub provider: ProviderId,
    /// Instrument the sample was for.
    pub instrument: InstrumentKey,
    /// Human-readable description.
    pub message: String,
    /// Metric snapshot at firing time.
    pub snapshot: LatencyMetricSnapshot,
    /// Firing time.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Latency Metric
// ============================================================================

/// Serializable snapshot of a latency metric.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyMetricSnapshot {
    /// Most recent sample.
    pub current_ms: f64,
    /// Minimum observed sample.
    pub min_ms: f64,
    /// Maximum observed sample.
    pub max_ms: f64,
    /// Rolling average over the percentile window.
    pub avg_ms: f64,
    /// 50th percentile (nearest-rank).
    pub p50_ms: f64,
    /// 90th percentile (nearest-rank).
    pub p90_ms: f64,
    /// 95th percentile (nearest-rank).
    pub p95_ms: f64,
    /// 99th percentile (nearest-rank).
    pub p99_ms: f64,
    /// Samples above the warning threshold.
    pub violations: u64,
    /// Total samples recorded.
    pub samples: u64,
    /// SLA thresholds in force for this metric.
    pub thresholds: SlaThresholds,
}

/// Rolling latency state for one (provider, instrument) pair.
///
/// Written only by the task processing that pair's inbound stream;
/// snapshots are the published read surface.
#[derive(Debug)]
pub struct LatencyMetric {
    ring: VecDeque<f64>,
    current_ms: f64,
    min_ms: f64,
    max_ms: f64,
    violations: u64,
    samples: u64,
    thresholds: SlaThresholds,
}

impl LatencyMetric {
    /// Create a metric governed by the given thresholds.
    #[must_use]
    pub fn new(thresholds: SlaThresholds) -> Self {
        Self {
            ring: VecDeque::with_capacity(RING_CAPACITY),
            current_ms: 0.0,
            min_ms: f64::INFINITY,
            max_ms: 0.0,
            violations: 0,
            samples: 0,
            thresholds,
        }
    }

    /// Record one latency sample.
    pub fn record(&mut self, latency_ms: f64) {
        self.current_ms = latency_ms;
        self.min_ms = self.min_ms.min(latency_ms);
        self.max_ms = self.max_ms.max(latency_ms);
        self.samples += 1;

        if self.ring.len() == RING_CAPACITY {
            self.ring.pop_front();
        }
        self.ring.push_back(latency_ms);

        if latency_ms > self.thresholds.warning_ms {
            self.violations += 1;
        }
    }

    /// Nearest-rank percentile over the most recent window.
    ///
    /// Index is `ceil(p/100 × n) − 1`, clamped to the valid range.
    #[must_use]
    pub fn percentile(&self, p: f64) -> f64 {
        let window = self.recent(PERCENTILE_WINDOW);
        if window.is_empty() {
            return 0.0;
        }

        let mut sorted = window;
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let index = (p / 100.0 * n as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(n - 1);
        sorted[index]
    }

    /// Rolling average over the percentile window.
    #[must_use]
    pub fn rolling_avg(&self) -> f64 {
        let window = self.recent(PERCENTILE_WINDOW);
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<f64>() / window.len() as f64
    }

    /// The most recent `n` samples, oldest first.
    fn recent(&self, n: usize) -> Vec<f64> {
        let skip = self.ring.len().saturating_sub(n);
        self.ring.iter().skip(skip).copied().collect()
    }

    /// Ordinary least squares slope (ms per sample) over the full ring.
    fn trend_slope(&self) -> f64 {
        let n = self.ring.len();
        if n < 2 {
            return 0.0;
        }

        let n_f = n as f64;
        let sum_x = (n * (n - 1)) as f64 / 2.0;
        let sum_x2 = ((n - 1) * n * (2 * n - 1)) as f64 / 6.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        for (i, y) in self.ring.iter().enumerate() {
            sum_y += y;
            sum_xy += i as f64 * y;
        }

        let denom = n_f * sum_x2 - sum_x * sum_x;
        if denom == 0.0 {
            0.0
        } else {
            (n_f * sum_xy - sum_x * sum_y) / denom
        }
    }

    /// Get a serializable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> LatencyMetricSnapshot {
        LatencyMetricSnapshot {
            current_ms: self.current_ms,
            min_ms: if self.min_ms.is_finite() {
                self.min_ms
            } else {
                0.0
            },
            max_ms: self.max_ms,
            avg_ms: self.rolling_avg(),
            p50_ms: self.percentile(50.0),
            p90_ms: self.percentile(90.0),
            p95_ms: self.percentile(95.0),
            p99_ms: self.percentile(99.0),
            violations: self.violations,
            samples: self.samples,
            thresholds: self.thresholds,
        }
    }

    /// Evaluate every alert rule against the current state.
    ///
    /// Rules run in registration order and independently; a firing rule
    /// never suppresses evaluation of the next one.
    fn evaluate_rules(&self) -> Vec<(AlertRuleKind, AlertSeverity, String)> {
        let mut fired = Vec::new();

        for rule in AlertRuleKind::all() {
            match rule {
                AlertRuleKind::HighLatency => {
                    if self.current_ms > self.thresholds.critical_ms {
                        fired.push((
                            *rule,
                            AlertSeverity::Error,
                            format!(
                                "latency {:.1}ms exceeds critical threshold {:.1}ms",
                                self.current_ms, self.thresholds.critical_ms
                            ),
                        ));
                    }
                }
                AlertRuleKind::Spike => {
                    // Short-term average over the samples preceding this one.
                    let prior: Vec<f64> = {
                        let len = self.ring.len();
                        let skip = len.saturating_sub(SPIKE_WINDOW + 1);
                        self.ring.iter().skip(skip).take(len - skip - 1).copied().collect()
                    };
                    if prior.len() >= SPIKE_MIN_SAMPLES {
                        let avg = prior.iter().sum::<f64>() / prior.len() as f64;
                        if avg > 0.0 && self.current_ms > 2.0 * avg {
                            fired.push((
                                *rule,
                                AlertSeverity::Warning,
                                format!(
                                    "latency {:.1}ms is more than double the recent average {:.1}ms",
                                    self.current_ms, avg
                                ),
                            ));
                        }
                    }
                }
                AlertRuleKind::SlaViolation => {
                    let window = self.recent(SLA_WINDOW);
                    if window.len() >= SLA_MIN_SAMPLES {
                        let over = window
                            .iter()
                            .filter(|l| **l > self.thresholds.warning_ms)
                            .count();
                        let fraction = over as f64 / window.len() as f64;
                        if fraction > SLA_VIOLATION_FRACTION {
                            fired.push((
                                *rule,
                                AlertSeverity::Error,
                                format!(
                                    "{over} of last {} samples above warning threshold {:.1}ms",
                                    window.len(),
                                    self.thresholds.warning_ms
                                ),
                            ));
                        }
                    }
                }
                AlertRuleKind::DegradationTrend => {
                    if self.ring.len() >= TREND_MIN_SAMPLES {
                        let slope = self.trend_slope();
                        if slope > TREND_SLOPE_THRESHOLD {
                            fired.push((
                                *rule,
                                AlertSeverity::Warning,
                                format!("latency degrading at {slope:.2}ms per sample"),
                            ));
                        }
                    }
                }
            }
        }

        fired
    }
}

// ============================================================================
// Latency Monitor
// ============================================================================

/// Configuration for the latency monitor.
#[derive(Debug, Clone)]
pub struct LatencyMonitorConfig {
    /// SLA table keyed by instrument class.
    pub sla_table: SlaTable,
    /// Minimum interval between repeated firings of one alert key.
    pub alert_cooldown: Duration,
}

impl Default for LatencyMonitorConfig {
    fn default() -> Self {
        Self {
            sla_table: SlaTable::default(),
            alert_cooldown: Duration::from_secs(60),
        }
    }
}

/// Per-(provider, instrument) latency monitor with alert evaluation.
#[derive(Debug)]
pub struct LatencyMonitor {
    config: LatencyMonitorConfig,
    metrics: HashMap<(ProviderId, InstrumentKey), LatencyMetric>,
    cooldowns: HashMap<(AlertRuleKind, ProviderId, InstrumentKey), Instant>,
    suppressed: u64,
}

impl Default for LatencyMonitor {
    fn default() -> Self {
        Self::new(LatencyMonitorConfig::default())
    }
}

impl LatencyMonitor {
    /// Create a monitor with the given configuration.
    #[must_use]
    pub fn new(config: LatencyMonitorConfig) -> Self {
        Self {
            config,
            metrics: HashMap::new(),
            cooldowns: HashMap::new(),
            suppressed: 0,
        }
    }

    /// Record a latency sample and evaluate alert rules.
    ///
    /// Returns the alerts that fired and survived cooldown suppression.
    pub fn record(
        &mut self,
        provider: &str,
        instrument: &str,
        class: InstrumentClass,
        latency_ms: f64,
    ) -> Vec<LatencyAlert> {
        let key = (provider.to_string(), instrument.to_string());
        let thresholds = self.config.sla_table.thresholds(class);
        let metric = self
            .metrics
            .entry(key)
            .or_insert_with(|| LatencyMetric::new(thresholds));

        metric.record(latency_ms);

        let fired = metric.evaluate_rules();
        if fired.is_empty() {
            return Vec::new();
        }

        let snapshot = metric.snapshot();
        let now = Instant::now();
        let mut alerts = Vec::new();

        for (rule, severity, message) in fired {
            let cooldown_key = (rule, provider.to_string(), instrument.to_string());
            if let Some(last) = self.cooldowns.get(&cooldown_key)
                && now.duration_since(*last) < self.config.alert_cooldown
            {
                self.suppressed += 1;
                tracing::debug!(
                    rule = %rule,
                    provider,
                    instrument,
                    "latency alert suppressed by cooldown"
                );
                continue;
            }

            self.cooldowns.insert(cooldown_key, now);
            alerts.push(LatencyAlert {
                rule,
                severity,
                provider: provider.to_string(),
                instrument: instrument.to_string(),
                message,
                snapshot: snapshot.clone(),
                timestamp: Utc::now(),
            });
        }

        alerts
    }

    /// Snapshot of one (provider, instrument) metric.
    #[must_use]
    pub fn metric_snapshot(
        &self,
        provider: &str,
        instrument: &str,
    ) -> Option<LatencyMetricSnapshot> {
        self.metrics
            .get(&(provider.to_string(), instrument.to_string()))
            .map(LatencyMetric::snapshot)
    }

    /// Total alert firings suppressed by cooldown.
    #[must_use]
    pub const fn suppressed_count(&self) -> u64 {
        self.suppressed
    }

    /// Drop metrics for an instrument no longer subscribed.
    pub fn forget_instrument(&mut self, instrument: &str) {
        self.metrics.retain(|(_, inst), _| inst != instrument);
        self.cooldowns.retain(|(_, _, inst), _| inst != instrument);
    }
}

// ============================================================================
// Tests
// ============================================================================
