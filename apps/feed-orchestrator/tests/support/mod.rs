//! Shared test fixtures: an in-memory provider network behind the
//! transport port, permissive auth collaborators, and event helpers.

// Each test binary uses a different slice of these fixtures.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use feed_orchestrator::{
    AnomalyDetector, AuthError, AuthScheme, Authenticator, BackoffConfig, ConnectionPool,
    CostOptimizationSettings, Credential, CredentialSource, EventBus, FeedEvent, FeedEventKind,
    FeedOrchestrator, InstrumentClass, LatencyMonitor, OrchestratorConfig, PriorityTier, Provider,
    ProviderRegistry, Transport, TransportError, TransportFactory,
};

// =============================================================================
// In-Memory Network
// =============================================================================

#[derive(Default)]
struct NetworkInner {
    failing: HashSet<String>,
    connections: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
    open_counts: HashMap<String, usize>,
}

/// An in-memory provider network. Endpoints can be told to refuse
/// connections, and the test can feed frames into the most recent
/// connection per endpoint.
#[derive(Clone, Default)]
pub struct FakeNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse future connections to an endpoint.
    pub fn fail_endpoint(&self, endpoint: &str) {
        self.inner.lock().failing.insert(endpoint.to_string());
    }

    /// Accept future connections to an endpoint again.
    pub fn restore_endpoint(&self, endpoint: &str) {
        self.inner.lock().failing.remove(endpoint);
    }

    /// Feed a frame into the most recent connection for an endpoint.
    /// Returns false when no live connection exists.
    pub fn push_frame(&self, endpoint: &str, frame: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .connections
            .get(endpoint)
            .and_then(|conns| conns.last())
            .is_some_and(|tx| tx.send(frame.to_string()).is_ok())
    }

    /// Drop every connection for an endpoint (peer-side close).
    pub fn close_connections(&self, endpoint: &str) {
        self.inner.lock().connections.remove(endpoint);
    }

    /// How many connections were opened against an endpoint.
    pub fn open_count(&self, endpoint: &str) -> usize {
        self.inner
            .lock()
            .open_counts
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    /// The transport factory backed by this network.
    pub fn factory(&self) -> Arc<dyn TransportFactory> {
        Arc::new(FakeFactory {
            inner: Arc::clone(&self.inner),
        })
    }
}

struct FakeFactory {
    inner: Arc<Mutex<NetworkInner>>,
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn open(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError> {
        let mut inner = self.inner.lock();
        *inner.open_counts.entry(endpoint.to_string()).or_insert(0) += 1;

        if inner.failing.contains(endpoint) {
            return Err(TransportError::OpenFailed {
                endpoint: endpoint.to_string(),
                reason: "endpoint marked failing".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner
            .connections
            .entry(endpoint.to_string())
            .or_default()
            .push(tx);

        Ok(Box::new(FakeTransport { rx }))
    }
}

struct FakeTransport {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&mut self, _text: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

// =============================================================================
// Auth Collaborators
// =============================================================================

/// Authenticator that accepts every handshake without touching the wire.
pub struct AcceptAllAuthenticator {
    scheme: AuthScheme,
}

impl AcceptAllAuthenticator {
    pub fn new(scheme: AuthScheme) -> Self {
        Self { scheme }
    }
}

#[async_trait]
impl Authenticator for AcceptAllAuthenticator {
    fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    async fn handshake(
        &self,
        _transport: &mut dyn Transport,
        _credential: &Credential,
    ) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Credential source with a fixed credential for every provider.
pub struct StaticCredentials;

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn credential(&self, _provider: &str) -> Result<Credential, AuthError> {
        Ok(Credential::new("test-material"))
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Endpoint used by [`provider`] fixtures.
pub fn endpoint_of(id: &str) -> String {
    format!("wss://{id}.test/stream")
}

/// A stock-quotes provider fixture.
pub fn provider(id: &str, cost: f64, priority: PriorityTier) -> Provider {
    Provider {
        id: id.to_string(),
        name: id.to_string(),
        endpoint: endpoint_of(id),
        auth_scheme: AuthScheme::ApiKey,
        cost_per_message: cost,
        latency_baseline_ms: 20.0,
        priority,
        supported_instrument_classes: vec![InstrumentClass::StockQuotes],
        active: true,
    }
}

/// Orchestrator config tightened for fast tests. Health checks are
/// parked far out so tests drive degradation explicitly.
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        connect_timeout: Duration::from_secs(2),
        max_connect_attempts: 3,
        staleness_window: Duration::from_secs(5),
        health_check_interval: Duration::from_secs(60),
        failover_budget: Duration::from_secs(5),
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter_factor: 0.0,
        },
        cost_optimization: CostOptimizationSettings {
            enabled: false,
            ..Default::default()
        },
    }
}

/// Build an orchestrator over the fake network with permissive auth.
pub fn build_orchestrator(
    providers: Vec<Provider>,
    config: OrchestratorConfig,
    network: &FakeNetwork,
) -> (Arc<FeedOrchestrator>, broadcast::Receiver<FeedEvent>) {
    let registry = Arc::new(ProviderRegistry::default());
    for p in providers {
        registry.register(p).unwrap();
    }

    let pool = Arc::new(ConnectionPool::new(network.factory()));
    let events = Arc::new(EventBus::new(256));
    let rx = events.subscribe();

    let orchestrator = Arc::new(FeedOrchestrator::new(
        config,
        registry,
        pool,
        Arc::new(StaticCredentials),
        vec![
            Arc::new(AcceptAllAuthenticator::new(AuthScheme::ApiKey)),
            Arc::new(AcceptAllAuthenticator::new(AuthScheme::OAuth)),
        ],
        events,
        AnomalyDetector::default(),
        LatencyMonitor::default(),
    ));

    (orchestrator, rx)
}

// =============================================================================
// Frames & Events
// =============================================================================

/// A valid tick frame timestamped `age_ms` milliseconds in the past.
pub fn tick_json_aged(symbol: &str, price: f64, volume: f64, age_ms: i64) -> String {
    let timestamp = Utc::now() - chrono::Duration::milliseconds(age_ms);
    format!(
        r#"{{"s":"{symbol}","p":"{price}","v":"{volume}","t":"{}"}}"#,
        timestamp.to_rfc3339()
    )
}

/// A valid tick frame timestamped now.
pub fn tick_json(symbol: &str, price: f64, volume: f64) -> String {
    tick_json_aged(symbol, price, volume, 0)
}

/// Await the next event matching the predicate, with a bounded wait.
pub async fn next_matching(
    rx: &mut broadcast::Receiver<FeedEvent>,
    mut pred: impl FnMut(&FeedEventKind) -> bool,
    wait: Duration,
) -> FeedEvent {
    tokio::time::timeout(wait, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event.kind) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("expected event did not arrive in time")
}
