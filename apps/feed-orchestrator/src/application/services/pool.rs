//! Connection Pool
//!
//! Owns transport-level connections per provider. `acquire` hands out an
//! idle open connection when one exists and opens a new one otherwise;
//! `release` returns a connection to the idle set and `close` tears one
//! down. Open failures are returned as error results so the orchestrator
//! can try a backup provider; no retry logic lives here.
//!
//! The idle map lock is never held across an `await`: reuse is checked
//! under the lock, the transport open runs without it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::application::ports::{Transport, TransportError, TransportFactory};
use crate::domain::provider::ProviderId;

// =============================================================================
// Pooled Connection
// =============================================================================

/// A transport connection handed out by the pool.
pub struct PooledConnection {
    /// Pool-assigned connection id.
    pub id: Uuid,
    /// Provider this connection belongs to.
    pub provider_id: ProviderId,
    /// Endpoint the connection was opened against.
    pub endpoint: String,
    /// The underlying transport.
    pub transport: Box<dyn Transport>,
    /// When the transport was opened.
    pub opened_at: Instant,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("provider_id", &self.provider_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Connection-count statistics.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Connections opened against upstream endpoints.
    pub opened: u64,
    /// Acquisitions served from the idle set.
    pub reused: u64,
    /// Connections torn down.
    pub closed: u64,
    /// Connections currently handed out.
    pub active: usize,
    /// Connections currently idle in the pool.
    pub idle: usize,
}

// =============================================================================
// Connection Pool
// =============================================================================

/// Pool of provider transport connections.
pub struct ConnectionPool {
    factory: Arc<dyn TransportFactory>,
    idle: Mutex<HashMap<ProviderId, Vec<PooledConnection>>>,
    opened: AtomicU64,
    reused: AtomicU64,
    closed: AtomicU64,
    active: AtomicUsize,
}

impl ConnectionPool {
    /// Create a pool over the given transport factory.
    #[must_use]
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            idle: Mutex::new(HashMap::new()),
            opened: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            active: AtomicUsize::new(0),
        }
    }

    /// Acquire a connection for a provider.
    ///
    /// Reuses an idle connection opened against the same endpoint when
    /// one exists, otherwise opens a new transport connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when a new connection cannot be opened.
    pub async fn acquire(
        &self,
        provider_id: &str,
        endpoint: &str,
    ) -> Result<PooledConnection, TransportError> {
        if let Some(conn) = self.take_idle(provider_id, endpoint) {
            self.reused.fetch_add(1, Ordering::Relaxed);
            self.active.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(provider = provider_id, id = %conn.id, "connection reused");
            return Ok(conn);
        }

        let transport = self.factory.open(endpoint).await?;
        self.opened.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);

        let conn = PooledConnection {
            id: Uuid::new_v4(),
            provider_id: provider_id.to_string(),
            endpoint: endpoint.to_string(),
            transport,
            opened_at: Instant::now(),
        };
        tracing::debug!(provider = provider_id, id = %conn.id, "connection opened");
        Ok(conn)
    }

    /// Return a healthy connection to the idle set.
    pub fn release(&self, conn: PooledConnection) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.idle
            .lock()
            .entry(conn.provider_id.clone())
            .or_default()
            .push(conn);
    }

    /// Tear down a specific connection.
    pub async fn close(&self, mut conn: PooledConnection) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.closed.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = conn.transport.close().await {
            tracing::debug!(provider = %conn.provider_id, error = %e, "transport close failed");
        }
    }

    /// Drop all idle connections for a provider without closing handshakes.
    pub fn evict_idle(&self, provider_id: &str) -> usize {
        let evicted = self
            .idle
            .lock()
            .remove(provider_id)
            .map_or(0, |conns| conns.len());
        self.closed.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// Connection-count statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            opened: self.opened.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            idle: self.idle.lock().values().map(Vec::len).sum(),
        }
    }

    /// Pop an idle connection matching provider and endpoint.
    fn take_idle(&self, provider_id: &str, endpoint: &str) -> Option<PooledConnection> {
        let mut idle = self.idle.lock();
        let conns = idle.get_mut(provider_id)?;
        let index = conns.iter().position(|c| c.endpoint == endpoint)?;
        Some(conns.swap_remove(index))
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
