//! Orchestrator Configuration Settings
//!
//! Runtime tunables loaded from environment variables, plus the provider
//! descriptor list and SLA table loaded from a JSON document.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::application::services::backoff::BackoffConfig;
use crate::application::services::orchestrator::{CostOptimizationSettings, OrchestratorConfig};
use crate::domain::health::HealthThresholds;
use crate::domain::latency::{LatencyMonitorConfig, SlaTable, SlaThresholds};
use crate::domain::provider::{InstrumentClass, Provider};

// =============================================================================
// Errors
// =============================================================================

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),

    /// Provider document could not be read.
    #[error("failed to read provider file {path}: {reason}")]
    ReadFailed {
        /// File that could not be read.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },

    /// Provider document could not be parsed.
    #[error("failed to parse provider file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Provider document contained no providers.
    #[error("provider file declares no providers")]
    NoProviders,
}

// =============================================================================
// Server Settings
// =============================================================================

/// HTTP status server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Status/health/metrics HTTP port.
    pub status_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { status_port: 8080 }
    }
}

// =============================================================================
// Orchestration Settings
// =============================================================================

/// Complete orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Per-attempt connect + handshake timeout.
    pub connect_timeout: Duration,
    /// Connect attempts per failover cycle.
    pub max_connect_attempts: u32,
    /// No-message staleness window.
    pub staleness_window: Duration,
    /// Health-check tick interval.
    pub health_check_interval: Duration,
    /// Failover completion budget.
    pub failover_budget: Duration,
    /// Cost-optimization pass interval.
    pub cost_optimization_interval: Duration,
    /// Minimum projected daily savings (USD) for a cost switch.
    pub cost_min_daily_savings_usd: f64,
    /// Whether cost switches require an equally healthy target.
    pub cost_require_healthy: bool,
    /// Health thresholds for the provider status machine.
    pub health_thresholds: HealthThresholds,
    /// Cooldown between repeated firings of a latency alert key.
    pub alert_cooldown: Duration,
    /// Event bus channel capacity.
    pub event_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            connect_timeout: Duration::from_secs(8),
            max_connect_attempts: 3,
            staleness_window: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(5),
            failover_budget: Duration::from_secs(5),
            cost_optimization_interval: Duration::from_secs(30),
            cost_min_daily_savings_usd: 5.0,
            cost_require_healthy: true,
            health_thresholds: HealthThresholds::default(),
            alert_cooldown: Duration::from_secs(60),
            event_capacity: 1024,
        }
    }
}

impl OrchestratorSettings {
    /// Create settings from environment variables, with defaults for
    /// anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server: ServerSettings {
                status_port: parse_env_u16("FEED_STATUS_PORT", defaults.server.status_port),
            },
            connect_timeout: parse_env_duration_secs(
                "FEED_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            ),
            max_connect_attempts: parse_env_u32(
                "FEED_MAX_CONNECT_ATTEMPTS",
                defaults.max_connect_attempts,
            ),
            staleness_window: parse_env_duration_secs(
                "FEED_STALENESS_WINDOW_SECS",
                defaults.staleness_window,
            ),
            health_check_interval: parse_env_duration_secs(
                "FEED_HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval,
            ),
            failover_budget: parse_env_duration_secs(
                "FEED_FAILOVER_BUDGET_SECS",
                defaults.failover_budget,
            ),
            cost_optimization_interval: parse_env_duration_secs(
                "FEED_COST_OPTIMIZATION_INTERVAL_SECS",
                defaults.cost_optimization_interval,
            ),
            cost_min_daily_savings_usd: parse_env_f64(
                "FEED_COST_MIN_DAILY_SAVINGS_USD",
                defaults.cost_min_daily_savings_usd,
            ),
            cost_require_healthy: parse_env_bool(
                "FEED_COST_REQUIRE_HEALTHY",
                defaults.cost_require_healthy,
            ),
            health_thresholds: HealthThresholds {
                min_uptime_pct: parse_env_f64(
                    "FEED_MIN_UPTIME_PCT",
                    defaults.health_thresholds.min_uptime_pct,
                ),
                max_latency_ms: parse_env_f64(
                    "FEED_MAX_LATENCY_MS",
                    defaults.health_thresholds.max_latency_ms,
                ),
                max_error_rate: parse_env_f64(
                    "FEED_MAX_ERROR_RATE",
                    defaults.health_thresholds.max_error_rate,
                ),
            },
            alert_cooldown: parse_env_duration_secs(
                "FEED_ALERT_COOLDOWN_SECS",
                defaults.alert_cooldown,
            ),
            event_capacity: parse_env_usize("FEED_EVENT_CAPACITY", defaults.event_capacity),
        }
    }

    /// Build the orchestrator configuration from these settings.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            connect_timeout: self.connect_timeout,
            max_connect_attempts: self.max_connect_attempts,
            staleness_window: self.staleness_window,
            health_check_interval: self.health_check_interval,
            failover_budget: self.failover_budget,
            backoff: BackoffConfig::default(),
            cost_optimization: CostOptimizationSettings {
                enabled: true,
                interval: self.cost_optimization_interval,
                min_daily_savings_usd: self.cost_min_daily_savings_usd,
                require_healthy: self.cost_require_healthy,
            },
        }
    }
}

// =============================================================================
// Provider Document
// =============================================================================

/// Parsed provider configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersDocument {
    /// Provider descriptors, in registration (tie-break) order.
    pub providers: Vec<Provider>,
    /// SLA table overrides per instrument class.
    #[serde(default)]
    pub sla: HashMap<InstrumentClass, SlaThresholds>,
    /// Instruments to subscribe at startup.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionEntry>,
}

/// One startup subscription request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEntry {
    /// Instrument key.
    pub instrument: String,
    /// Instrument class.
    pub class: InstrumentClass,
}

impl ProvidersDocument {
    /// Parse a provider document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed JSON or an empty provider list.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let document: Self = serde_json::from_str(json)?;
        if document.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        Ok(document)
    }

    /// Load a provider document from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    /// Load from the path named by `FEED_PROVIDERS_PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the variable is unset or the file is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("FEED_PROVIDERS_PATH")
            .map_err(|_| ConfigError::MissingEnvVar("FEED_PROVIDERS_PATH".to_string()))?;
        if path.is_empty() {
            return Err(ConfigError::EmptyValue("FEED_PROVIDERS_PATH".to_string()));
        }
        Self::load(Path::new(&path))
    }

    /// Build the SLA table: defaults overlaid with document entries.
    #[must_use]
    pub fn sla_table(&self) -> SlaTable {
        let mut table = SlaTable::default();
        for (class, thresholds) in &self.sla {
            table.set(*class, *thresholds);
        }
        table
    }

    /// Build the latency monitor configuration.
    #[must_use]
    pub fn latency_config(&self, alert_cooldown: Duration) -> LatencyMonitorConfig {
        LatencyMonitorConfig {
            sla_table: self.sla_table(),
            alert_cooldown,
        }
    }
}

// =============================================================================
// Env Parsing Helpers
// =============================================================================

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v.to_lowercase() != "false")
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::AuthScheme;

    const SAMPLE_DOCUMENT: &str = r#"{
        "providers": [
            {
                "id": "alpha",
                "name": "Alpha Feed",
                "endpoint": "wss://alpha.example.com/stream",
                "authScheme": "api_key",
                "costPerMessage": 0.0001,
                "latencyBaselineMs": 20.0,
                "priority": "high",
                "supportedInstrumentClasses": ["stock_quotes"]
            },
            {
                "id": "beta",
                "name": "Beta Feed",
                "endpoint": "wss://beta.example.com/stream",
                "authScheme": "oauth",
                "costPerMessage": 0.0002,
                "latencyBaselineMs": 30.0,
                "priority": "medium",
                "supportedInstrumentClasses": ["stock_quotes", "options_data"]
            }
        ],
        "sla": {
            "stock_quotes": { "targetMs": 40.0, "warningMs": 60.0, "criticalMs": 90.0 }
        },
        "subscriptions": [
            { "instrument": "AAPL", "class": "stock_quotes" }
        ]
    }"#;

    #[test]
    fn settings_defaults() {
        let settings = OrchestratorSettings::default();
        assert_eq!(settings.server.status_port, 8080);
        assert_eq!(settings.connect_timeout, Duration::from_secs(8));
        assert_eq!(settings.max_connect_attempts, 3);
        assert_eq!(settings.staleness_window, Duration::from_secs(30));
        assert_eq!(settings.health_check_interval, Duration::from_secs(5));
        assert_eq!(settings.cost_optimization_interval, Duration::from_secs(30));
    }

    #[test]
    fn orchestrator_config_from_settings() {
        let settings = OrchestratorSettings::default();
        let config = settings.orchestrator_config();

        assert_eq!(config.connect_timeout, settings.connect_timeout);
        assert_eq!(
            config.cost_optimization.min_daily_savings_usd,
            settings.cost_min_daily_savings_usd
        );
    }

    #[test]
    fn document_parses_providers_in_order() {
        let document = ProvidersDocument::from_json_str(SAMPLE_DOCUMENT).unwrap();

        assert_eq!(document.providers.len(), 2);
        assert_eq!(document.providers[0].id, "alpha");
        assert_eq!(document.providers[0].auth_scheme, AuthScheme::ApiKey);
        assert_eq!(document.providers[1].id, "beta");
        assert_eq!(document.providers[1].auth_scheme, AuthScheme::OAuth);
    }

    #[test]
    fn document_parses_startup_subscriptions() {
        let document = ProvidersDocument::from_json_str(SAMPLE_DOCUMENT).unwrap();

        assert_eq!(document.subscriptions.len(), 1);
        assert_eq!(document.subscriptions[0].instrument, "AAPL");
        assert_eq!(
            document.subscriptions[0].class,
            InstrumentClass::StockQuotes
        );
    }

    #[test]
    fn document_sla_overrides_defaults() {
        let document = ProvidersDocument::from_json_str(SAMPLE_DOCUMENT).unwrap();
        let table = document.sla_table();

        let stock = table.thresholds(InstrumentClass::StockQuotes);
        assert_eq!(stock.warning_ms, 60.0);

        // Untouched classes keep their defaults.
        let options = table.thresholds(InstrumentClass::OptionsData);
        assert_eq!(options.warning_ms, 150.0);
    }

    #[test]
    fn empty_provider_list_rejected() {
        let result = ProvidersDocument::from_json_str(r#"{"providers": []}"#);
        assert!(matches!(result, Err(ConfigError::NoProviders)));
    }

    #[test]
    fn malformed_document_rejected() {
        let result = ProvidersDocument::from_json_str("not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
