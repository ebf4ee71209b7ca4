//! Port Interfaces
//!
//! Contracts for the external collaborators this core consumes, following
//! the Hexagonal Architecture pattern used across the workspace.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`TransportFactory`] / [`Transport`]: provider-specific wire
//!   connections (open / send / receive / close); the core is agnostic to
//!   the protocol behind them
//! - [`Authenticator`]: scheme-specific handshake over an open transport
//! - [`CredentialSource`]: opaque auth material per provider id

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::provider::{AuthScheme, ProviderId};

// =============================================================================
// Errors
// =============================================================================

/// Transport-level failure. Retried by the orchestrator via
/// backup-provider selection, never inside the transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("connection to {endpoint} failed: {reason}")]
    OpenFailed {
        /// Endpoint that refused the connection.
        endpoint: String,
        /// Underlying failure description.
        reason: String,
    },

    /// Opening the connection exceeded the configured timeout.
    #[error("connection to {0} timed out")]
    OpenTimeout(String),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,
}

/// Authentication failure. Never retried against the same provider;
/// escalated to backup selection.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential source has no material for this provider.
    #[error("credentials unavailable for provider {0}")]
    CredentialsUnavailable(ProviderId),

    /// The provider rejected the handshake.
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// The handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failed mid-handshake.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// =============================================================================
// Credential
// =============================================================================

/// Opaque auth material supplied by a credential collaborator.
///
/// The `Debug` implementation redacts the value for safe logging.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Wrap raw credential material.
    #[must_use]
    pub fn new(material: impl Into<String>) -> Self {
        Self(material.into())
    }

    /// Expose the raw material for a handshake frame.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}

// =============================================================================
// Ports
// =============================================================================

/// An open, bidirectional connection to a provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection gracefully.
    async fn receive(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens provider-specific transport connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a connection to the given endpoint.
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// Supplies opaque credentials per provider id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch the credential for a provider.
    async fn credential(&self, provider: &str) -> Result<Credential, AuthError>;
}

/// Performs a scheme-specific auth handshake over an open transport.
///
/// Implementations are dispatched from the provider's declared
/// [`AuthScheme`], so new schemes are added as implementations rather
/// than string matches.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// The scheme this authenticator implements.
    fn scheme(&self) -> AuthScheme;

    /// Run the handshake to completion.
    async fn handshake(
        &self,
        transport: &mut dyn Transport,
        credential: &Credential,
    ) -> Result<(), AuthError>;
}

// =============================================================================
// Tests
// =============================================================================
