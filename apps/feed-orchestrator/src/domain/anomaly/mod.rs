//! Inline anomaly detection for inbound market data.
//!
//! Maintains a bounded rolling price/volume history per instrument and
//! flags statistical outliers: price deviation from the rolling mean and
//! volume spikes over the rolling mean volume.
//!
//! Every check runs on the hot path for each inbound message, so the
//! implementation is O(window size) with no allocation beyond the ring
//! buffers. The current sample is always admitted into the window, even
//! when flagged, so the baseline adapts to new regimes instead of staying
//! anchored to stale history.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::domain::provider::InstrumentKey;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for anomaly detection.
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// Rolling history capacity per instrument (default: 100).
    pub history_capacity: usize,
    /// Minimum samples before checks run (default: 10).
    pub warmup_samples: usize,
    /// Price deviation fraction that flags an anomaly (default: 0.10).
    pub price_deviation_threshold: f64,
    /// Price deviation fraction that escalates to high severity (default: 0.20).
    pub price_deviation_high: f64,
    /// Volume-over-mean factor that flags an anomaly (default: 5.0).
    pub volume_spike_factor: f64,
    /// Volume-over-mean factor that escalates to high severity (default: 10.0).
    pub volume_spike_high_factor: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            warmup_samples: 10,
            price_deviation_threshold: 0.10,
            price_deviation_high: 0.20,
            volume_spike_factor: 5.0,
            volume_spike_high_factor: 10.0,
        }
    }
}

// ============================================================================
// Record Types
// ============================================================================

/// Kind of detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Price deviated from the rolling mean.
    PriceDeviation,
    /// Volume spiked over the rolling mean volume.
    VolumeSpike,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriceDeviation => write!(f, "price_deviation"),
            Self::VolumeSpike => write!(f, "volume_spike"),
        }
    }
}

/// Severity of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    /// Past the primary threshold.
    Medium,
    /// Past the escalation threshold.
    High,
}

/// Result of a single anomaly check. Transient: not persisted beyond the
/// detection call.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyRecord {
    /// Instrument symbol.
    pub symbol: InstrumentKey,
    /// Detected anomaly kinds.
    pub kinds: Vec<AnomalyKind>,
    /// Highest severity across detected kinds.
    pub severity: AnomalySeverity,
    /// Price deviation fraction from the rolling mean, when flagged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_deviation: Option<f64>,
    /// Rolling price standard deviation at detection time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_std_dev: Option<f64>,
    /// Volume-over-mean ratio, when flagged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_ratio: Option<f64>,
}

// ============================================================================
// Rolling History
// ============================================================================

/// Bounded price/volume history for one instrument.
#[derive(Debug)]
struct InstrumentHistory {
    prices: VecDeque<f64>,
    volumes: VecDeque<f64>,
}

impl InstrumentHistory {
    fn new(capacity: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(capacity),
            volumes: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, price: f64, volume: f64, capacity: usize) {
        if self.prices.len() == capacity {
            self.prices.pop_front();
            self.volumes.pop_front();
        }
        self.prices.push_back(price);
        self.volumes.push_back(volume);
    }

    fn len(&self) -> usize {
        self.prices.len()
    }

    fn price_mean(&self) -> f64 {
        mean(&self.prices)
    }

    fn price_std_dev(&self) -> f64 {
        let m = self.price_mean();
        let n = self.prices.len();
        if n == 0 {
            return 0.0;
        }
        let variance = self.prices.iter().map(|p| (p - m).powi(2)).sum::<f64>() / n as f64;
        variance.sqrt()
    }

    fn volume_mean(&self) -> f64 {
        mean(&self.volumes)
    }
}

fn mean(values: &VecDeque<f64>) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// ============================================================================
// Detector
// ============================================================================

/// Statistical anomaly detector over per-instrument rolling history.
#[derive(Debug)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
    histories: HashMap<InstrumentKey, InstrumentHistory>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}

impl AnomalyDetector {
    /// Create a detector with the given configuration.
    #[must_use]
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    /// Check one inbound sample against the instrument's rolling history.
    ///
    /// Returns a record when the price or volume is anomalous relative to
    /// the existing window. The sample is admitted into the window in
    /// every case; below the warm-up threshold it is recorded and `None`
    /// is returned.
    pub fn check(&mut self, symbol: &str, price: f64, volume: f64) -> Option<AnomalyRecord> {
        let capacity = self.config.history_capacity;
        let history = self
            .histories
            .entry(symbol.to_string())
            .or_insert_with(|| InstrumentHistory::new(capacity));

        if history.len() < self.config.warmup_samples {
            history.push(price, volume, capacity);
            return None;
        }

        let mut kinds = Vec::new();
        let mut severity = AnomalySeverity::Medium;
        let mut price_deviation = None;
        let mut price_std_dev = None;
        let mut volume_ratio = None;

        // Price check against the window as it stood before this sample.
        let mean_price = history.price_mean();
        if mean_price > 0.0 {
            let deviation = (price - mean_price).abs() / mean_price;
            if deviation > self.config.price_deviation_threshold {
                kinds.push(AnomalyKind::PriceDeviation);
                price_deviation = Some(deviation);
                price_std_dev = Some(history.price_std_dev());
                if deviation > self.config.price_deviation_high {
                    severity = AnomalySeverity::High;
                }
            }
        }

        // Volume check against the same pre-sample window.
        let mean_volume = history.volume_mean();
        if mean_volume > 0.0 {
            let ratio = volume / mean_volume;
            if ratio > self.config.volume_spike_factor {
                kinds.push(AnomalyKind::VolumeSpike);
                volume_ratio = Some(ratio);
                if ratio > self.config.volume_spike_high_factor {
                    severity = AnomalySeverity::High;
                }
            }
        }

        history.push(price, volume, capacity);

        if kinds.is_empty() {
            return None;
        }

        Some(AnomalyRecord {
            symbol: symbol.to_string(),
            kinds,
            severity,
            price_deviation,
            price_std_dev,
            volume_ratio,
        })
    }

    /// Number of samples currently held for an instrument.
    #[must_use]
    pub fn history_len(&self, symbol: &str) -> usize {
        self.histories.get(symbol).map_or(0, InstrumentHistory::len)
    }

    /// Drop history for instruments no longer subscribed.
    pub fn forget(&mut self, symbol: &str) {
        self.histories.remove(symbol);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn warm_up(detector: &mut AnomalyDetector, symbol: &str, price: f64, volume: f64, n: usize) {
        for _ in 0..n {
            let _ = detector.check(symbol, price, volume);
        }
    }

    #[test]
    fn no_anomaly_before_warmup() {
        let mut detector = AnomalyDetector::default();

        // Wildly varying values below the warm-up count never flag.
        for i in 0..9 {
            let price = if i % 2 == 0 { 1.0 } else { 1000.0 };
            assert!(detector.check("AAPL", price, 1.0).is_none());
        }
        assert_eq!(detector.history_len("AAPL"), 9);
    }

    #[test]
    fn price_deviation_medium_severity() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);

        // 15% deviation: above the 10% threshold, below the 20% escalation.
        let record = detector.check("AAPL", 115.0, 1000.0).unwrap();
        assert_eq!(record.kinds, vec![AnomalyKind::PriceDeviation]);
        assert_eq!(record.severity, AnomalySeverity::Medium);
        assert!((record.price_deviation.unwrap() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn price_deviation_high_severity() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);

        let record = detector.check("AAPL", 125.0, 1000.0).unwrap();
        assert_eq!(record.severity, AnomalySeverity::High);
        assert!((record.price_deviation.unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn small_price_move_not_flagged() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);

        assert!(detector.check("AAPL", 105.0, 1000.0).is_none());
    }

    #[test]
    fn volume_spike_at_six_times_mean() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);

        let record = detector.check("AAPL", 100.0, 6000.0).unwrap();
        assert_eq!(record.kinds, vec![AnomalyKind::VolumeSpike]);
        assert_eq!(record.severity, AnomalySeverity::Medium);
        assert!((record.volume_ratio.unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn volume_four_times_mean_not_flagged() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);

        assert!(detector.check("AAPL", 100.0, 4000.0).is_none());
    }

    #[test]
    fn volume_spike_high_severity() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);

        let record = detector.check("AAPL", 100.0, 12_000.0).unwrap();
        assert_eq!(record.severity, AnomalySeverity::High);
    }

    #[test]
    fn combined_price_and_volume_anomaly() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);

        let record = detector.check("AAPL", 130.0, 20_000.0).unwrap();
        assert_eq!(
            record.kinds,
            vec![AnomalyKind::PriceDeviation, AnomalyKind::VolumeSpike]
        );
        assert_eq!(record.severity, AnomalySeverity::High);
    }

    #[test]
    fn flagged_sample_enters_the_window() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);

        let _ = detector.check("AAPL", 130.0, 1000.0);
        assert_eq!(detector.history_len("AAPL"), 11);

        // The shock is now part of the baseline: the mean has shifted so a
        // repeat of the same price deviates less than before.
        let second = detector.check("AAPL", 130.0, 1000.0).unwrap();
        assert!(second.price_deviation.unwrap() < 0.30);
    }

    #[test]
    fn history_bounded_at_capacity() {
        let config = AnomalyConfig {
            history_capacity: 20,
            ..Default::default()
        };
        let mut detector = AnomalyDetector::new(config);

        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 50);
        assert_eq!(detector.history_len("AAPL"), 20);
    }

    #[test]
    fn instruments_are_independent() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);
        warm_up(&mut detector, "MSFT", 400.0, 500.0, 10);

        // AAPL spike does not disturb MSFT's baseline.
        let _ = detector.check("AAPL", 150.0, 1000.0);
        assert!(detector.check("MSFT", 405.0, 500.0).is_none());
    }

    #[test]
    fn forget_drops_history() {
        let mut detector = AnomalyDetector::default();
        warm_up(&mut detector, "AAPL", 100.0, 1000.0, 10);

        detector.forget("AAPL");
        assert_eq!(detector.history_len("AAPL"), 0);

        // Back to warm-up behavior.
        assert!(detector.check("AAPL", 500.0, 99_999.0).is_none());
    }
}
