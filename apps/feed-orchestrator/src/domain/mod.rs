//! Domain layer - Core orchestration logic with no I/O dependencies.

/// Anomaly detection over rolling per-instrument history.
pub mod anomaly;

/// Provider health records and the hysteretic status machine.
pub mod health;

/// Latency metrics, percentiles, and alert rules.
pub mod latency;

/// Provider descriptors, priority tiers, and instrument classes.
pub mod provider;

/// Weighted provider scoring and selection.
pub mod selection;

/// Inbound tick messages and validation.
pub mod streaming;

/// Subscription binding state.
pub mod subscription;
