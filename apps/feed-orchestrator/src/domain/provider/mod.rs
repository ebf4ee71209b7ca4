//! Provider Descriptor Types
//!
//! Domain types describing an upstream market data provider: identity,
//! transport endpoint, declared auth scheme, cost model, priority tier,
//! and the instrument classes it can serve.
//!
//! Providers are created at configuration load. Priority and cost may be
//! updated at runtime; a provider is never removed during a session, only
//! marked inactive.

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a provider.
pub type ProviderId = String;

/// An instrument key (ticker or contract symbol).
pub type InstrumentKey = String;

// =============================================================================
// Priority Tier
// =============================================================================

/// Routing priority tier declared per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    /// Preferred providers.
    High,
    /// Standard providers.
    Medium,
    /// Last-resort providers.
    Low,
    /// No tier declared in configuration.
    #[default]
    Unspecified,
}

impl PriorityTier {
    /// Parse tier from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unspecified,
        }
    }

    /// Get the tier name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unspecified => "unspecified",
        }
    }

    /// Normalized 0-100 score used by the selection engine.
    #[must_use]
    pub const fn score(&self) -> f64 {
        match self {
            Self::High => 90.0,
            Self::Medium => 70.0,
            Self::Low => 50.0,
            Self::Unspecified => 60.0,
        }
    }
}

// =============================================================================
// Instrument Class
// =============================================================================

/// A named category of market data with its own latency SLA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    /// Equity quote data.
    StockQuotes,
    /// Options chain data.
    OptionsData,
    /// Futures contract data.
    FuturesData,
    /// Foreign exchange quote data.
    FxQuotes,
}

impl InstrumentClass {
    /// Get all instrument classes.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::StockQuotes,
            Self::OptionsData,
            Self::FuturesData,
            Self::FxQuotes,
        ]
    }

    /// Get the class name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StockQuotes => "stock_quotes",
            Self::OptionsData => "options_data",
            Self::FuturesData => "futures_data",
            Self::FxQuotes => "fx_quotes",
        }
    }
}

impl std::fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Auth Scheme
// =============================================================================

/// Authentication scheme declared per provider.
///
/// Dispatched to an `Authenticator` implementation by the orchestrator;
/// the scheme tag itself carries no credential material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// Key/secret pair sent in the handshake frame.
    ApiKey,
    /// Bearer token obtained out-of-band.
    #[serde(rename = "oauth")]
    OAuth,
}

impl AuthScheme {
    /// Get the scheme name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::OAuth => "oauth",
        }
    }
}

// =============================================================================
// Provider Descriptor
// =============================================================================

/// An upstream market data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Unique provider identifier.
    pub id: ProviderId,
    /// Human-readable name.
    pub name: String,
    /// Transport endpoint URL.
    pub endpoint: String,
    /// Declared authentication scheme.
    pub auth_scheme: AuthScheme,
    /// Declared cost per message in USD.
    pub cost_per_message: f64,
    /// Declared baseline latency in milliseconds.
    pub latency_baseline_ms: f64,
    /// Routing priority tier.
    #[serde(default)]
    pub priority: PriorityTier,
    /// Instrument classes this provider can serve.
    pub supported_instrument_classes: Vec<InstrumentClass>,
    /// Whether the provider is currently eligible for routing.
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl Provider {
    /// Check whether this provider serves the given instrument class.
    #[must_use]
    pub fn supports(&self, class: InstrumentClass) -> bool {
        self.supported_instrument_classes.contains(&class)
    }

    /// Projected daily cost at the given message throughput.
    #[must_use]
    pub fn projected_daily_cost(&self, messages_per_second: f64) -> f64 {
        self.cost_per_message * messages_per_second * 86_400.0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn sample_provider() -> Provider {
        Provider {
            id: "alpha".to_string(),
            name: "Alpha Feed".to_string(),
            endpoint: "wss://alpha.example.com/stream".to_string(),
            auth_scheme: AuthScheme::ApiKey,
            cost_per_message: 0.0001,
            latency_baseline_ms: 20.0,
            priority: PriorityTier::High,
            supported_instrument_classes: vec![InstrumentClass::StockQuotes],
            active: true,
        }
    }

    #[test_case(PriorityTier::High, 90.0)]
    #[test_case(PriorityTier::Medium, 70.0)]
    #[test_case(PriorityTier::Low, 50.0)]
    #[test_case(PriorityTier::Unspecified, 60.0)]
    fn priority_tier_scores(tier: PriorityTier, expected: f64) {
        assert_eq!(tier.score(), expected);
    }

    #[test]
    fn priority_tier_parsing() {
        assert_eq!(
            PriorityTier::from_str_case_insensitive("HIGH"),
            PriorityTier::High
        );
        assert_eq!(
            PriorityTier::from_str_case_insensitive("medium"),
            PriorityTier::Medium
        );
        assert_eq!(
            PriorityTier::from_str_case_insensitive("bogus"),
            PriorityTier::Unspecified
        );
    }

    #[test]
    fn instrument_class_all() {
        assert_eq!(InstrumentClass::all().len(), 4);
        assert!(InstrumentClass::all().contains(&InstrumentClass::StockQuotes));
    }

    #[test]
    fn provider_supports_class() {
        let provider = sample_provider();
        assert!(provider.supports(InstrumentClass::StockQuotes));
        assert!(!provider.supports(InstrumentClass::OptionsData));
    }

    #[test]
    fn projected_daily_cost() {
        let provider = sample_provider();
        // 0.0001 USD/msg * 10 msg/s * 86_400 s = 86.40 USD/day
        let cost = provider.projected_daily_cost(10.0);
        assert!((cost - 86.4).abs() < 1e-9);
    }

    #[test]
    fn descriptor_deserializes_camel_case() {
        let json = r#"{
            "id": "beta",
            "name": "Beta Feed",
            "endpoint": "wss://beta.example.com/stream",
            "authScheme": "oauth",
            "costPerMessage": 0.0002,
            "latencyBaselineMs": 35.0,
            "priority": "medium",
            "supportedInstrumentClasses": ["stock_quotes", "options_data"]
        }"#;

        let provider: Provider = serde_json::from_str(json).unwrap();
        assert_eq!(provider.id, "beta");
        assert_eq!(provider.auth_scheme, AuthScheme::OAuth);
        assert_eq!(provider.priority, PriorityTier::Medium);
        assert!(provider.active); // defaulted
        assert_eq!(provider.supported_instrument_classes.len(), 2);
    }
}
