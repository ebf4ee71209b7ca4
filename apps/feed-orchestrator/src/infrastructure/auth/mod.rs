//! Authenticator Adapters
//!
//! Scheme-specific handshake implementations behind the [`Authenticator`]
//! port, plus an environment-backed credential source. Providers declare
//! their scheme in configuration; the orchestrator dispatches to the
//! matching adapter, so adding a scheme means adding an implementation
//! here rather than growing a string match.
//!
//! # Handshake Protocol
//!
//! Both adapters speak the common upstream convention:
//! 1. Send an auth frame naming the scheme and carrying the material
//! 2. Await one JSON ack: `{"status":"ok"}` or
//!    `{"status":"error","message":"..."}`

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{
    AuthError, Authenticator, Credential, CredentialSource, Transport, TransportError,
};
use crate::domain::provider::AuthScheme;

// =============================================================================
// Credential Source
// =============================================================================

/// Credential source reading opaque material from environment variables.
///
/// Provider `alpha-feed` resolves to `FEED_CREDENTIAL_ALPHA_FEED`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialSource;

impl EnvCredentialSource {
    /// Create the source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn var_name(provider: &str) -> String {
        let suffix: String = provider
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("FEED_CREDENTIAL_{suffix}")
    }
}

#[async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn credential(&self, provider: &str) -> Result<Credential, AuthError> {
        let var = Self::var_name(provider);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Ok(Credential::new(value)),
            _ => Err(AuthError::CredentialsUnavailable(provider.to_string())),
        }
    }
}

// =============================================================================
// Handshake Ack
// =============================================================================

/// Ack frame received after sending the auth request.
#[derive(Debug, Deserialize)]
struct AuthAck {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Await and interpret the single handshake ack frame.
async fn await_ack(transport: &mut dyn Transport) -> Result<(), AuthError> {
    let frame = transport
        .receive()
        .await?
        .ok_or(AuthError::Transport(TransportError::Closed))?;

    let ack: AuthAck = serde_json::from_str(&frame)
        .map_err(|e| AuthError::Rejected(format!("malformed auth ack: {e}")))?;

    if ack.status == "ok" {
        Ok(())
    } else {
        Err(AuthError::Rejected(
            ack.message.unwrap_or_else(|| ack.status.clone()),
        ))
    }
}

// =============================================================================
// API Key
// =============================================================================

/// Key/secret handshake: the material is sent in the auth frame.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuthenticator;

impl ApiKeyAuthenticator {
    /// Create the authenticator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::ApiKey
    }

    async fn handshake(
        &self,
        transport: &mut dyn Transport,
        credential: &Credential,
    ) -> Result<(), AuthError> {
        let request = serde_json::json!({
            "action": "auth",
            "scheme": "api_key",
            "key": credential.expose(),
        });
        transport
            .send(&request.to_string())
            .await
            .map_err(AuthError::Transport)?;

        await_ack(transport).await
    }
}

// =============================================================================
// OAuth
// =============================================================================

/// Bearer-token handshake: the material is a token obtained out-of-band.
#[derive(Debug, Clone, Default)]
pub struct OAuthAuthenticator;

impl OAuthAuthenticator {
    /// Create the authenticator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for OAuthAuthenticator {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::OAuth
    }

    async fn handshake(
        &self,
        transport: &mut dyn Transport,
        credential: &Credential,
    ) -> Result<(), AuthError> {
        let request = serde_json::json!({
            "action": "auth",
            "scheme": "oauth",
            "token": format!("Bearer {}", credential.expose()),
        });
        transport
            .send(&request.to_string())
            .await
            .map_err(AuthError::Transport)?;

        await_ack(transport).await
    }
}

/// The default authenticator set, one per declared scheme.
#[must_use]
pub fn default_authenticators() -> Vec<std::sync::Arc<dyn Authenticator>> {
    vec![
        std::sync::Arc::new(ApiKeyAuthenticator::new()),
        std::sync::Arc::new(OAuthAuthenticator::new()),
    ]
}

// =============================================================================
// Tests
// =============================================================================
