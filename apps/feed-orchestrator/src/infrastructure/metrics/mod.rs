//! Prometheus Metrics Module
//!
//! Exposes orchestrator metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Messages**: validated messages and dropped malformed payloads
//! - **Anomalies**: detections by severity
//! - **Failovers**: completions, failures, and duration
//! - **Alerts**: latency alert firings by rule
//! - **Connections**: pool and subscription gauges
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the status server port. Counters
//! are driven from the orchestrator's event stream via [`record_event`].

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::events::{FeedEvent, FeedEventKind};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Message counters
    describe_counter!(
        "feed_messages_received_total",
        "Validated messages received from providers"
    );
    describe_counter!(
        "feed_messages_dropped_total",
        "Malformed messages dropped by validation"
    );

    // Anomaly counters
    describe_counter!(
        "feed_anomalies_detected_total",
        "Anomalous ticks flagged by the detector"
    );

    // Provider health counters
    describe_counter!(
        "feed_provider_unhealthy_total",
        "Provider transitions into the unhealthy state"
    );
    describe_counter!(
        "feed_provider_recovered_total",
        "Provider transitions back to the active state"
    );

    // Failover counters
    describe_counter!("feed_failovers_total", "Completed provider failovers");
    describe_counter!(
        "feed_failover_failures_total",
        "Subscriptions terminated with all providers exhausted"
    );
    describe_counter!(
        "feed_cost_optimizations_total",
        "Failovers triggered by the cost-optimization pass"
    );

    // Alert counters
    describe_counter!(
        "feed_latency_alerts_total",
        "Latency alert firings by rule and severity"
    );

    // Gauges
    describe_gauge!(
        "feed_active_connections",
        "Transport connections currently handed out by the pool"
    );
    describe_gauge!("feed_subscriptions", "Live instrument subscriptions");

    // Histograms
    describe_histogram!(
        "feed_message_latency_seconds",
        "End-to-end latency of validated messages"
    );
    describe_histogram!(
        "feed_failover_duration_seconds",
        "Wall-clock duration of completed failovers"
    );
}

// =============================================================================
// Event Recording
// =============================================================================

/// Fold one orchestrator event into the Prometheus counters.
pub fn record_event(event: &FeedEvent) {
    match &event.kind {
        FeedEventKind::MessageReceived {
            provider,
            latency_ms,
            ..
        } => {
            counter!(
                "feed_messages_received_total",
                "provider" => provider.clone()
            )
            .increment(1);
            histogram!(
                "feed_message_latency_seconds",
                "provider" => provider.clone()
            )
            .record(latency_ms / 1000.0);
        }
        FeedEventKind::Anomaly { provider, record } => {
            counter!(
                "feed_anomalies_detected_total",
                "provider" => provider.clone(),
                "severity" => format!("{:?}", record.severity).to_lowercase()
            )
            .increment(1);
        }
        FeedEventKind::ProviderUnhealthy { provider, .. } => {
            counter!(
                "feed_provider_unhealthy_total",
                "provider" => provider.clone()
            )
            .increment(1);
        }
        FeedEventKind::ProviderRecovered { provider } => {
            counter!(
                "feed_provider_recovered_total",
                "provider" => provider.clone()
            )
            .increment(1);
        }
        FeedEventKind::FailoverCompleted {
            provider,
            duration_ms,
            ..
        } => {
            counter!(
                "feed_failovers_total",
                "provider" => provider.clone()
            )
            .increment(1);
            histogram!("feed_failover_duration_seconds")
                .record(*duration_ms as f64 / 1000.0);
        }
        FeedEventKind::FailoverFailed { instrument, .. } => {
            counter!(
                "feed_failover_failures_total",
                "instrument" => instrument.clone()
            )
            .increment(1);
        }
        FeedEventKind::CostOptimization { to_provider, .. } => {
            counter!(
                "feed_cost_optimizations_total",
                "provider" => to_provider.clone()
            )
            .increment(1);
        }
        FeedEventKind::LatencyAlert { alert } => {
            counter!(
                "feed_latency_alerts_total",
                "rule" => alert.rule.as_str(),
                "provider" => alert.provider.clone()
            )
            .increment(1);
        }
        FeedEventKind::SymbolConnected { .. } | FeedEventKind::FailoverSuccess { .. } => {}
    }
}

/// Update the active-connection gauge from the pool.
pub fn set_active_connections(count: f64) {
    gauge!("feed_active_connections").set(count);
}

/// Update the live-subscription gauge.
pub fn set_subscriptions(count: f64) {
    gauge!("feed_subscriptions").set(count);
}

// =============================================================================
// Tests
// =============================================================================
