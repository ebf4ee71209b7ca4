//! Inbound Market Data Messages
//!
//! Wire-level tick payloads received from upstream providers, with
//! structural validation. Malformed payloads surface as
//! [`ValidationError`] so the caller can log, drop, and count them
//! without touching connection state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// A malformed inbound message.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Payload was not valid JSON for a tick.
    #[error("malformed tick payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Payload decoded but carried an empty symbol.
    #[error("tick payload missing symbol")]
    MissingSymbol,

    /// Payload decoded but carried a non-positive price.
    #[error("tick payload has non-positive price: {0}")]
    NonPositivePrice(Decimal),

    /// Payload decoded but carried a negative volume.
    #[error("tick payload has negative volume: {0}")]
    NegativeVolume(Decimal),
}

// =============================================================================
// Tick Message
// =============================================================================

/// A single market data tick from an upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickMessage {
    /// Instrument symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Trade or quote price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Trade or interval volume.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Provider-side timestamp.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

impl TickMessage {
    /// Decode and validate a tick from a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the payload is not valid JSON or
    /// fails structural checks.
    pub fn decode(text: &str) -> Result<Self, ValidationError> {
        let tick: Self = serde_json::from_str(text)?;
        tick.validate()?;
        Ok(tick)
    }

    /// Structural validation of a decoded tick.
    fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.is_empty() {
            return Err(ValidationError::MissingSymbol);
        }
        if self.price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice(self.price));
        }
        if self.volume < Decimal::ZERO {
            return Err(ValidationError::NegativeVolume(self.volume));
        }
        Ok(())
    }

    /// Price as `f64` for rolling statistics.
    #[must_use]
    pub fn price_f64(&self) -> f64 {
        self.price.to_f64().unwrap_or(0.0)
    }

    /// Volume as `f64` for rolling statistics.
    #[must_use]
    pub fn volume_f64(&self) -> f64 {
        self.volume.to_f64().unwrap_or(0.0)
    }

    /// Milliseconds between the provider timestamp and `now`.
    ///
    /// Clamped at zero for clock skew that would produce a negative value.
    #[must_use]
    pub fn latency_ms(&self, now: DateTime<Utc>) -> f64 {
        let delta = now.signed_duration_since(self.timestamp);
        delta.num_milliseconds().max(0) as f64
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn decode_valid_tick() {
        let json = r#"{"s":"AAPL","p":"187.23","v":"1200","t":"2026-08-07T14:30:00Z"}"#;
        let tick = TickMessage::decode(json).unwrap();

        assert_eq!(tick.symbol, "AAPL");
        assert_eq!(tick.price, dec!(187.23));
        assert_eq!(tick.volume, dec!(1200));
    }

    #[test]
    fn decode_rejects_garbage() {
        let result = TickMessage::decode("not json");
        assert!(matches!(result, Err(ValidationError::Malformed(_))));
    }

    #[test]
    fn decode_rejects_empty_symbol() {
        let json = r#"{"s":"","p":"10","v":"1","t":"2026-08-07T14:30:00Z"}"#;
        assert!(matches!(
            TickMessage::decode(json),
            Err(ValidationError::MissingSymbol)
        ));
    }

    #[test]
    fn decode_rejects_non_positive_price() {
        let json = r#"{"s":"AAPL","p":"0","v":"1","t":"2026-08-07T14:30:00Z"}"#;
        assert!(matches!(
            TickMessage::decode(json),
            Err(ValidationError::NonPositivePrice(_))
        ));
    }

    #[test]
    fn decode_rejects_negative_volume() {
        let json = r#"{"s":"AAPL","p":"10","v":"-5","t":"2026-08-07T14:30:00Z"}"#;
        assert!(matches!(
            TickMessage::decode(json),
            Err(ValidationError::NegativeVolume(_))
        ));
    }

    #[test]
    fn latency_from_provider_timestamp() {
        let sent = Utc.with_ymd_and_hms(2026, 8, 7, 14, 30, 0).unwrap();
        let tick = TickMessage {
            symbol: "AAPL".to_string(),
            price: dec!(10),
            volume: dec!(1),
            timestamp: sent,
        };

        let now = sent + chrono::Duration::milliseconds(42);
        assert_eq!(tick.latency_ms(now), 42.0);
    }

    #[test]
    fn latency_clamped_on_clock_skew() {
        let sent = Utc.with_ymd_and_hms(2026, 8, 7, 14, 30, 0).unwrap();
        let tick = TickMessage {
            symbol: "AAPL".to_string(),
            price: dec!(10),
            volume: dec!(1),
            timestamp: sent,
        };

        let earlier = sent - chrono::Duration::milliseconds(100);
        assert_eq!(tick.latency_ms(earlier), 0.0);
    }
}
