//! Failover Orchestrator
//!
//! Top-level coordinator owning the connect / subscribe / monitor /
//! fail-over state machine per instrument. Consults the selection engine
//! against registry health, drives the connection pool, runs inbound
//! messages through anomaly detection and latency recording, and emits
//! the typed event stream consumed by external collaborators.
//!
//! Each subscription runs in its own task with its own cancellation
//! token; one instrument's failure never cascades into another's. The
//! health-check and cost-optimization passes run as independent periodic
//! tasks tied to the orchestrator's shutdown token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::application::events::{EventBus, FeedEventKind};
use crate::application::ports::{AuthError, Authenticator, CredentialSource, TransportError};
use crate::application::services::backoff::{BackoffConfig, BackoffPolicy};
use crate::application::services::pool::{ConnectionPool, PoolStats, PooledConnection};
use crate::application::services::registry::{ProviderRegistry, ProviderStatusSnapshot};
use crate::domain::anomaly::AnomalyDetector;
use crate::domain::health::{HealthStatus, HealthTransition};
use crate::domain::latency::LatencyMonitor;
use crate::domain::provider::{AuthScheme, InstrumentClass, InstrumentKey, Provider, ProviderId};
use crate::domain::selection::{SelectionEngine, SelectionError};
use crate::domain::streaming::TickMessage;
use crate::domain::subscription::{
    FailoverReason, Subscription, SubscriptionPhase, SubscriptionSnapshot,
};

// ============================================================================
// Configuration
// ============================================================================

/// Cost-optimization pass settings.
#[derive(Debug, Clone)]
pub struct CostOptimizationSettings {
    /// Whether the pass runs at all.
    pub enabled: bool,
    /// Interval between passes.
    pub interval: Duration,
    /// Minimum projected daily savings (USD) that justifies a switch.
    pub min_daily_savings_usd: f64,
    /// Require the cheaper provider to be at least as healthy as the
    /// current one.
    pub require_healthy: bool,
}

impl Default for CostOptimizationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            min_daily_savings_usd: 5.0,
            require_healthy: true,
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-attempt connect + handshake timeout.
    pub connect_timeout: Duration,
    /// Connect attempts per failover cycle before giving up.
    pub max_connect_attempts: u32,
    /// No-message window after which a binding is judged stale.
    pub staleness_window: Duration,
    /// Interval between health-check ticks.
    pub health_check_interval: Duration,
    /// Target completion budget for a failover.
    pub failover_budget: Duration,
    /// Backoff between connect attempts.
    pub backoff: BackoffConfig,
    /// Cost-optimization pass settings.
    pub cost_optimization: CostOptimizationSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(8),
            max_connect_attempts: 3,
            staleness_window: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(5),
            failover_budget: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
            cost_optimization: CostOptimizationSettings::default(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Orchestrator API failure.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No active provider supports the requested instrument class.
    #[error(transparent)]
    NoProviderAvailable(#[from] SelectionError),

    /// The instrument already has a live binding.
    #[error("instrument {0} is already subscribed")]
    AlreadySubscribed(InstrumentKey),

    /// The instrument has no binding to tear down.
    #[error("instrument {0} is not subscribed")]
    NotSubscribed(InstrumentKey),
}

/// Connect-phase failure, internal to the state machine.
#[derive(Debug, Error)]
enum ConnectError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("no authenticator registered for scheme {0:?}")]
    MissingAuthenticator(AuthScheme),
}

// ============================================================================
// Failover Statistics
// ============================================================================

/// Rolling failover statistics.
#[derive(Debug, Default)]
struct FailoverStats {
    completed: u64,
    total_duration_ms: u64,
    over_budget: u64,
}

impl FailoverStats {
    fn record(&mut self, duration: Duration, budget: Duration) {
        self.completed += 1;
        self.total_duration_ms += duration.as_millis() as u64;
        if duration > budget {
            self.over_budget += 1;
        }
    }

    fn snapshot(&self) -> FailoverStatsSnapshot {
        FailoverStatsSnapshot {
            completed: self.completed,
            avg_duration_ms: if self.completed == 0 {
                0.0
            } else {
                self.total_duration_ms as f64 / self.completed as f64
            },
            over_budget: self.over_budget,
        }
    }
}

/// Serializable failover statistics.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverStatsSnapshot {
    /// Completed failovers.
    pub completed: u64,
    /// Rolling average failover duration.
    pub avg_duration_ms: f64,
    /// Failovers that exceeded the time budget.
    pub over_budget: u64,
}

// ============================================================================
// Subscription Plumbing
// ============================================================================

/// Instruction for a streaming task to rebind to another provider.
#[derive(Debug, Clone)]
struct SwitchDirective {
    reason: FailoverReason,
    /// Pre-selected target; `None` lets the failover path pick a backup.
    target: Option<ProviderId>,
}

/// Handle owned by the orchestrator per live subscription.
struct SubscriptionHandle {
    state: Arc<Mutex<Subscription>>,
    cancel: CancellationToken,
    switch_tx: watch::Sender<Option<SwitchDirective>>,
}

/// Why a streaming session ended.
enum StreamEnd {
    Cancelled,
    Stale,
    PeerClosed,
    Transport(TransportError),
    Switch(SwitchDirective),
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time view of the orchestrator for the status surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorSnapshot {
    /// Every registered provider with its health record.
    pub providers: Vec<ProviderStatusSnapshot>,
    /// Every live subscription binding.
    pub subscriptions: Vec<SubscriptionSnapshot>,
    /// Connection pool counters.
    pub pool: PoolStats,
    /// Failover statistics.
    pub failover: FailoverStatsSnapshot,
    /// Latency alert firings suppressed by cooldown.
    pub alerts_suppressed: u64,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Coordinates provider selection, connections, monitoring, and failover
/// for every subscribed instrument.
pub struct FeedOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<ProviderRegistry>,
    pool: Arc<ConnectionPool>,
    selection: SelectionEngine,
    credentials: Arc<dyn CredentialSource>,
    authenticators: HashMap<AuthScheme, Arc<dyn Authenticator>>,
    events: Arc<EventBus>,
    anomaly: Mutex<AnomalyDetector>,
    latency: Mutex<LatencyMonitor>,
    subscriptions: Mutex<HashMap<InstrumentKey, SubscriptionHandle>>,
    failover_stats: Mutex<FailoverStats>,
    cancel: CancellationToken,
}

impl FeedOrchestrator {
    /// Create an orchestrator over injected collaborators.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<ProviderRegistry>,
        pool: Arc<ConnectionPool>,
        credentials: Arc<dyn CredentialSource>,
        authenticators: Vec<Arc<dyn Authenticator>>,
        events: Arc<EventBus>,
        anomaly: AnomalyDetector,
        latency: LatencyMonitor,
    ) -> Self {
        let authenticators = authenticators
            .into_iter()
            .map(|a| (a.scheme(), a))
            .collect();

        Self {
            config,
            registry,
            pool,
            selection: SelectionEngine::default(),
            credentials,
            authenticators,
            events,
            anomaly: Mutex::new(anomaly),
            latency: Mutex::new(latency),
            subscriptions: Mutex::new(HashMap::new()),
            failover_stats: Mutex::new(FailoverStats::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe an instrument to the best available provider.
    ///
    /// Selection happens synchronously so a missing provider surfaces to
    /// the caller; the connect + stream loop runs in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NoProviderAvailable`] when no active
    /// provider supports the class, or `AlreadySubscribed` when the
    /// instrument already has a live binding.
    pub fn subscribe(
        self: &Arc<Self>,
        instrument: &str,
        class: InstrumentClass,
    ) -> Result<(), OrchestratorError> {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(instrument) {
            return Err(OrchestratorError::AlreadySubscribed(instrument.to_string()));
        }

        let candidates = self.registry.candidates(class);
        let provider = self.selection.select_best(class, &candidates)?.clone();

        let state = Arc::new(Mutex::new(Subscription::connecting(
            instrument, class, &provider.id,
        )));
        let cancel = self.cancel.child_token();
        let (switch_tx, switch_rx) = watch::channel(None);

        subscriptions.insert(
            instrument.to_string(),
            SubscriptionHandle {
                state: Arc::clone(&state),
                cancel: cancel.clone(),
                switch_tx,
            },
        );
        drop(subscriptions);

        tracing::info!(instrument, provider = %provider.id, "subscription requested");

        let orchestrator = Arc::clone(self);
        let instrument = instrument.to_string();
        tokio::spawn(async move {
            orchestrator
                .run_subscription(instrument, class, provider, state, cancel, switch_rx)
                .await;
        });

        Ok(())
    }

    /// Tear down an instrument's binding.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotSubscribed`] when the instrument
    /// has no live binding.
    pub fn unsubscribe(&self, instrument: &str) -> Result<(), OrchestratorError> {
        let handle = self
            .subscriptions
            .lock()
            .remove(instrument)
            .ok_or_else(|| OrchestratorError::NotSubscribed(instrument.to_string()))?;

        handle.cancel.cancel();
        handle.state.lock().phase = SubscriptionPhase::Unsubscribed;
        self.latency.lock().forget_instrument(instrument);
        self.anomaly.lock().forget(instrument);

        tracing::info!(instrument, "unsubscribed");
        Ok(())
    }

    /// Spawn the periodic health-check and cost-optimization tasks.
    pub fn start_background_tasks(self: &Arc<Self>) {
        let health = Arc::clone(self);
        tokio::spawn(async move {
            health.run_health_checks().await;
        });

        if self.config.cost_optimization.enabled {
            let cost = Arc::clone(self);
            tokio::spawn(async move {
                cost.run_cost_optimization().await;
            });
        }
    }

    /// Cancel every subscription task and periodic task.
    pub fn shutdown(&self) {
        tracing::info!("orchestrator shutting down");
        self.cancel.cancel();
    }

    /// Subscribe to the outbound event stream.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Point-in-time view for the status surface.
    #[must_use]
    pub fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            providers: self.registry.snapshot(),
            subscriptions: self
                .subscriptions
                .lock()
                .values()
                .map(|handle| handle.state.lock().snapshot())
                .collect(),
            pool: self.pool.stats(),
            failover: self.failover_stats.lock().snapshot(),
            alerts_suppressed: self.latency.lock().suppressed_count(),
        }
    }

    /// Current phase of an instrument's binding, if subscribed.
    #[must_use]
    pub fn subscription_phase(&self, instrument: &str) -> Option<SubscriptionPhase> {
        self.subscriptions
            .lock()
            .get(instrument)
            .map(|handle| handle.state.lock().phase)
    }

    // ========================================================================
    // Subscription State Machine
    // ========================================================================

    /// Per-instrument connect / stream / fail-over loop.
    #[allow(clippy::too_many_lines)]
    async fn run_subscription(
        self: Arc<Self>,
        instrument: InstrumentKey,
        class: InstrumentClass,
        initial_provider: Provider,
        state: Arc<Mutex<Subscription>>,
        cancel: CancellationToken,
        mut switch_rx: watch::Receiver<Option<SwitchDirective>>,
    ) {
        let mut provider = initial_provider;
        let mut backoff = BackoffPolicy::new(self.config.backoff.clone());
        let mut attempts: u32 = 0;
        // Set while a failover (as opposed to the initial connect) is in
        // progress.
        let mut failover: Option<(ProviderId, FailoverReason, Instant)> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            state.lock().phase = if failover.is_some() {
                SubscriptionPhase::FailingOver
            } else {
                SubscriptionPhase::Connecting
            };

            attempts += 1;
            match self.connect(&provider).await {
                Ok(conn) => {
                    attempts = 0;
                    backoff.reset();

                    if let Some((from, reason, started)) = failover.take() {
                        state.lock().rebind(&provider.id);
                        self.events.emit(FeedEventKind::FailoverSuccess {
                            instrument: instrument.clone(),
                            from_provider: from,
                            to_provider: provider.id.clone(),
                            reason,
                        });

                        let duration = started.elapsed();
                        let within_budget = duration <= self.config.failover_budget;
                        self.failover_stats
                            .lock()
                            .record(duration, self.config.failover_budget);
                        if !within_budget {
                            tracing::warn!(
                                instrument = %instrument,
                                duration_ms = duration.as_millis() as u64,
                                budget_ms = self.config.failover_budget.as_millis() as u64,
                                "failover exceeded time budget"
                            );
                        }
                        self.events.emit(FeedEventKind::FailoverCompleted {
                            instrument: instrument.clone(),
                            provider: provider.id.clone(),
                            duration_ms: duration.as_millis() as u64,
                            within_budget,
                        });
                    } else {
                        state.lock().phase = SubscriptionPhase::Connected;
                        self.events.emit(FeedEventKind::SymbolConnected {
                            provider: provider.id.clone(),
                            instrument: instrument.clone(),
                        });
                    }

                    tracing::info!(instrument = %instrument, provider = %provider.id, "streaming");

                    let end = self
                        .stream(conn, &provider.id, &instrument, class, &state, &cancel, &mut switch_rx)
                        .await;

                    match end {
                        StreamEnd::Cancelled => break,
                        StreamEnd::Switch(directive) => {
                            state.lock().phase = SubscriptionPhase::Degraded;
                            let target = directive
                                .target
                                .as_ref()
                                .and_then(|id| self.registry.provider(id))
                                .filter(|p| p.active);

                            let next = match target {
                                Some(p) => Some(p),
                                None => self.select_backup(class, &provider.id),
                            };

                            match next {
                                Some(next_provider) => {
                                    failover =
                                        Some((provider.id.clone(), directive.reason, Instant::now()));
                                    provider = next_provider;
                                }
                                None => {
                                    self.report_exhausted(&instrument, &provider.id, attempts);
                                    break;
                                }
                            }
                        }
                        StreamEnd::Stale | StreamEnd::PeerClosed | StreamEnd::Transport(_) => {
                            if let StreamEnd::Transport(ref e) = end {
                                tracing::warn!(
                                    instrument = %instrument,
                                    provider = %provider.id,
                                    error = %e,
                                    "stream transport error"
                                );
                            } else {
                                tracing::warn!(
                                    instrument = %instrument,
                                    provider = %provider.id,
                                    "stream ended without data"
                                );
                            }
                            state.lock().phase = SubscriptionPhase::Degraded;
                            self.registry.record_error(&provider.id);

                            let reason = match end {
                                StreamEnd::Stale => FailoverReason::Degraded,
                                _ => FailoverReason::ConnectFailure,
                            };
                            match self.select_backup(class, &provider.id) {
                                Some(next_provider) => {
                                    failover = Some((provider.id.clone(), reason, Instant::now()));
                                    provider = next_provider;
                                }
                                None => {
                                    self.report_exhausted(&instrument, &provider.id, attempts);
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        instrument = %instrument,
                        provider = %provider.id,
                        error = %e,
                        attempt = attempts,
                        "connect failed"
                    );
                    self.registry.record_error(&provider.id);

                    if attempts >= self.config.max_connect_attempts {
                        self.report_exhausted(&instrument, &provider.id, attempts);
                        break;
                    }

                    // Never retry the failed provider immediately; walk to
                    // a backup.
                    match self.select_backup(class, &provider.id) {
                        Some(next_provider) => {
                            if failover.is_none() {
                                failover = Some((
                                    provider.id.clone(),
                                    FailoverReason::ConnectFailure,
                                    Instant::now(),
                                ));
                            }
                            provider = next_provider;
                        }
                        None => {
                            self.report_exhausted(&instrument, &provider.id, attempts);
                            break;
                        }
                    }

                    let delay = backoff.next_delay();
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::debug!(instrument = %instrument, "subscription task exited");
    }

    /// Acquire a pooled connection and run the provider's auth handshake.
    async fn connect(&self, provider: &Provider) -> Result<PooledConnection, ConnectError> {
        let acquire = self.pool.acquire(&provider.id, &provider.endpoint);
        let mut conn = tokio::time::timeout(self.config.connect_timeout, acquire)
            .await
            .map_err(|_| TransportError::OpenTimeout(provider.endpoint.clone()))??;

        let authenticator = self
            .authenticators
            .get(&provider.auth_scheme)
            .ok_or(ConnectError::MissingAuthenticator(provider.auth_scheme))?;

        let credential = self.credentials.credential(&provider.id).await;
        let credential = match credential {
            Ok(credential) => credential,
            Err(e) => {
                self.pool.close(conn).await;
                return Err(e.into());
            }
        };

        let handshake = authenticator.handshake(conn.transport.as_mut(), &credential);
        match tokio::time::timeout(self.config.connect_timeout, handshake).await {
            Ok(Ok(())) => Ok(conn),
            Ok(Err(e)) => {
                self.pool.close(conn).await;
                Err(e.into())
            }
            Err(_) => {
                self.pool.close(conn).await;
                Err(AuthError::Timeout(self.config.connect_timeout).into())
            }
        }
    }

    /// Process inbound frames until the stream ends or is redirected.
    ///
    /// Frames for a given (provider, instrument) pair are processed in
    /// arrival order; anomaly detection and latency recording run inline.
    #[allow(clippy::too_many_arguments)]
    async fn stream(
        &self,
        mut conn: PooledConnection,
        provider_id: &str,
        instrument: &str,
        class: InstrumentClass,
        state: &Arc<Mutex<Subscription>>,
        cancel: &CancellationToken,
        switch_rx: &mut watch::Receiver<Option<SwitchDirective>>,
    ) -> StreamEnd {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.pool.close(conn).await;
                    return StreamEnd::Cancelled;
                }
                changed = switch_rx.changed() => {
                    let maybe_directive = if changed.is_ok() {
                        switch_rx.borrow_and_update().clone()
                    } else {
                        None
                    };
                    if let Some(directive) = maybe_directive {
                        // Tear down before rebinding: no dual-delivery window.
                        self.pool.close(conn).await;
                        return StreamEnd::Switch(directive);
                    }
                }
                frame = tokio::time::timeout(self.config.staleness_window, conn.transport.receive()) => {
                    match frame {
                        Err(_elapsed) => {
                            self.pool.close(conn).await;
                            return StreamEnd::Stale;
                        }
                        Ok(Ok(Some(text))) => {
                            self.process_frame(&text, provider_id, instrument, class, state);
                        }
                        Ok(Ok(None)) => {
                            self.pool.close(conn).await;
                            return StreamEnd::PeerClosed;
                        }
                        Ok(Err(e)) => {
                            self.pool.close(conn).await;
                            return StreamEnd::Transport(e);
                        }
                    }
                }
            }
        }
    }

    /// Validate and fold one inbound frame into the monitors.
    fn process_frame(
        &self,
        text: &str,
        provider_id: &str,
        instrument: &str,
        class: InstrumentClass,
        state: &Arc<Mutex<Subscription>>,
    ) {
        let tick = match TickMessage::decode(text) {
            Ok(tick) => tick,
            Err(e) => {
                // Malformed data is dropped; the connection stays up.
                tracing::debug!(provider = provider_id, instrument, error = %e, "tick dropped");
                self.registry.record_validation_error(provider_id);
                return;
            }
        };

        let latency_ms = tick.latency_ms(Utc::now());

        state.lock().record_message();
        self.registry.record_success(provider_id);
        self.registry.record_latency(provider_id, latency_ms);

        if let Some(record) =
            self.anomaly
                .lock()
                .check(&tick.symbol, tick.price_f64(), tick.volume_f64())
        {
            tracing::warn!(
                provider = provider_id,
                symbol = %record.symbol,
                severity = ?record.severity,
                "anomalous tick"
            );
            self.events.emit(FeedEventKind::Anomaly {
                provider: provider_id.to_string(),
                record,
            });
        }

        let alerts = self
            .latency
            .lock()
            .record(provider_id, instrument, class, latency_ms);
        for alert in alerts {
            self.events.emit(FeedEventKind::LatencyAlert { alert });
        }

        self.events.emit(FeedEventKind::MessageReceived {
            provider: provider_id.to_string(),
            instrument: instrument.to_string(),
            latency_ms,
        });
    }

    /// Pick a backup provider, excluding the one that just failed.
    fn select_backup(&self, class: InstrumentClass, exclude: &str) -> Option<Provider> {
        let candidates = self.registry.candidates(class);
        self.selection
            .select_backup(class, exclude, &candidates)
            .cloned()
    }

    /// Terminal failure: all candidates exhausted for this subscription.
    fn report_exhausted(&self, instrument: &str, provider_id: &str, attempts: u32) {
        tracing::error!(
            instrument,
            provider = provider_id,
            attempts,
            "no provider available; subscription terminated"
        );
        self.events.emit(FeedEventKind::FailoverFailed {
            instrument: instrument.to_string(),
            provider: provider_id.to_string(),
            attempts,
        });

        if let Some(handle) = self.subscriptions.lock().remove(instrument) {
            handle.state.lock().phase = SubscriptionPhase::Unsubscribed;
        }
    }

    // ========================================================================
    // Periodic Tasks
    // ========================================================================

    /// Health-check loop: tick the registry and degrade any subscription
    /// bound to a provider that crossed into the unhealthy state.
    async fn run_health_checks(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.health_check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("health-check task cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.health_check_pass();
                }
            }
        }
    }

    /// One idempotent health-check pass.
    fn health_check_pass(&self) {
        for (provider_id, transition) in self.registry.tick() {
            match transition {
                HealthTransition::BecameUnhealthy(issues) => {
                    tracing::warn!(provider = %provider_id, ?issues, "provider unhealthy");
                    self.events.emit(FeedEventKind::ProviderUnhealthy {
                        provider: provider_id.clone(),
                        issues: issues.iter().map(ToString::to_string).collect(),
                    });
                    self.degrade_bound_subscriptions(&provider_id);
                }
                HealthTransition::Recovered => {
                    tracing::info!(provider = %provider_id, "provider recovered");
                    self.events.emit(FeedEventKind::ProviderRecovered {
                        provider: provider_id,
                    });
                }
            }
        }
    }

    /// Direct every subscription bound to an unhealthy provider to fail
    /// over to a backup.
    fn degrade_bound_subscriptions(&self, provider_id: &str) {
        let subscriptions = self.subscriptions.lock();
        for handle in subscriptions.values() {
            let bound = {
                let state = handle.state.lock();
                state.phase == SubscriptionPhase::Connected && state.provider_id == provider_id
            };
            if bound {
                let _ = handle.switch_tx.send(Some(SwitchDirective {
                    reason: FailoverReason::Degraded,
                    target: None,
                }));
            }
        }
    }

    /// Cost-optimization loop.
    async fn run_cost_optimization(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.cost_optimization.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("cost-optimization task cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.cost_optimization_pass();
                }
            }
        }
    }

    /// Rebind connected subscriptions whose projected daily cost can be
    /// cut by at least the configured savings threshold.
    fn cost_optimization_pass(&self) {
        let settings = &self.config.cost_optimization;
        let subscriptions = self.subscriptions.lock();

        for handle in subscriptions.values() {
            let (instrument, class, current_id, connected) = {
                let state = handle.state.lock();
                (
                    state.instrument.clone(),
                    state.class,
                    state.provider_id.clone(),
                    state.phase == SubscriptionPhase::Connected,
                )
            };
            if !connected {
                continue;
            }

            let Some(switch) = self.find_cheaper_provider(class, &current_id, settings) else {
                continue;
            };

            tracing::info!(
                instrument = %instrument,
                from = %current_id,
                to = %switch.0,
                savings_usd = switch.1,
                "cost optimization switch"
            );
            self.events.emit(FeedEventKind::CostOptimization {
                instrument,
                from_provider: current_id,
                to_provider: switch.0.clone(),
                projected_daily_savings: switch.1,
            });
            let _ = handle.switch_tx.send(Some(SwitchDirective {
                reason: FailoverReason::CostOptimization,
                target: Some(switch.0),
            }));
        }
    }

    /// Find the provider with the largest projected daily savings over
    /// the current binding, subject to the minimum-health bar.
    fn find_cheaper_provider(
        &self,
        class: InstrumentClass,
        current_id: &str,
        settings: &CostOptimizationSettings,
    ) -> Option<(ProviderId, f64)> {
        let current = self.registry.provider(current_id)?;
        let current_health = self.registry.health_snapshot(current_id)?;

        // Savings are projected from observed throughput; a binding that
        // has not produced throughput yet never switches on cost.
        let throughput = current_health.messages_per_second;
        if throughput <= 0.0 {
            return None;
        }
        let current_cost = current.projected_daily_cost(throughput);

        let mut best: Option<(ProviderId, f64)> = None;
        for (candidate, health) in self.registry.candidates(class) {
            if candidate.id == current_id {
                continue;
            }
            if settings.require_healthy
                && (health.status != HealthStatus::Active
                    || health.error_rate > current_health.error_rate
                    || health.uptime_pct < current_health.uptime_pct)
            {
                continue;
            }

            let savings = current_cost - candidate.projected_daily_cost(throughput);
            if savings >= settings.min_daily_savings_usd
                && best.as_ref().is_none_or(|(_, s)| savings > *s)
            {
                best = Some((candidate.id, savings));
            }
        }

        best
    }
}

impl std::fmt::Debug for FeedOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedOrchestrator")
            .field("subscriptions", &self.subscriptions.lock().len())
            .field("providers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{Credential, MockCredentialSource, MockTransportFactory};
    use crate::domain::provider::PriorityTier;

    fn provider(id: &str, cost: f64) -> Provider {
        Provider {
            id: id.to_string(),
            name: id.to_string(),
            endpoint: format!("wss://{id}.example.com"),
            auth_scheme: AuthScheme::ApiKey,
            cost_per_message: cost,
            latency_baseline_ms: 20.0,
            priority: PriorityTier::Medium,
            supported_instrument_classes: vec![InstrumentClass::StockQuotes],
            active: true,
        }
    }

    fn orchestrator_with(providers: Vec<Provider>) -> Arc<FeedOrchestrator> {
        let registry = Arc::new(ProviderRegistry::default());
        for p in providers {
            registry.register(p).unwrap();
        }

        let mut factory = MockTransportFactory::new();
        factory.expect_open().returning(|endpoint| {
            Err(TransportError::OpenFailed {
                endpoint: endpoint.to_string(),
                reason: "test factory".to_string(),
            })
        });

        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_credential()
            .returning(|_| Ok(Credential::new("test")));

        Arc::new(FeedOrchestrator::new(
            OrchestratorConfig::default(),
            registry,
            Arc::new(ConnectionPool::new(Arc::new(factory))),
            Arc::new(credentials),
            vec![],
            Arc::new(EventBus::default()),
            AnomalyDetector::default(),
            LatencyMonitor::default(),
        ))
    }

    #[test]
    fn config_defaults() {
        let config = OrchestratorConfig::default();
        assert!(config.connect_timeout >= Duration::from_secs(5));
        assert!(config.connect_timeout <= Duration::from_secs(10));
        assert_eq!(config.max_connect_attempts, 3);
        assert_eq!(config.staleness_window, Duration::from_secs(30));
        assert_eq!(config.failover_budget, Duration::from_secs(5));
        assert_eq!(config.cost_optimization.interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn subscribe_without_candidates_is_fatal() {
        let orchestrator = orchestrator_with(vec![]);

        let result = orchestrator.subscribe("AAPL", InstrumentClass::StockQuotes);
        assert!(matches!(
            result,
            Err(OrchestratorError::NoProviderAvailable(
                SelectionError::NoProviderAvailable(InstrumentClass::StockQuotes)
            ))
        ));
    }

    #[tokio::test]
    async fn duplicate_subscribe_rejected() {
        let orchestrator = orchestrator_with(vec![provider("alpha", 0.0001)]);

        orchestrator
            .subscribe("AAPL", InstrumentClass::StockQuotes)
            .unwrap();
        let result = orchestrator.subscribe("AAPL", InstrumentClass::StockQuotes);
        assert!(matches!(
            result,
            Err(OrchestratorError::AlreadySubscribed(_))
        ));

        orchestrator.shutdown();
    }

    #[tokio::test]
    async fn unsubscribe_unknown_instrument_errors() {
        let orchestrator = orchestrator_with(vec![provider("alpha", 0.0001)]);

        let result = orchestrator.unsubscribe("AAPL");
        assert!(matches!(result, Err(OrchestratorError::NotSubscribed(_))));
    }

    #[test]
    fn failover_stats_rolling_average() {
        let mut stats = FailoverStats::default();
        let budget = Duration::from_secs(5);

        stats.record(Duration::from_millis(1000), budget);
        stats.record(Duration::from_millis(3000), budget);
        stats.record(Duration::from_millis(8000), budget);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.completed, 3);
        assert!((snapshot.avg_duration_ms - 4000.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.over_budget, 1);
    }

    #[test]
    fn cheaper_provider_requires_observed_throughput() {
        let orchestrator = orchestrator_with(vec![
            provider("expensive", 0.01),
            provider("cheap", 0.0001),
        ]);

        // No throughput observed yet: no switch on cold data.
        let result = orchestrator.find_cheaper_provider(
            InstrumentClass::StockQuotes,
            "expensive",
            &CostOptimizationSettings::default(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn cheaper_provider_found_past_savings_threshold() {
        let orchestrator = orchestrator_with(vec![
            provider("expensive", 0.01),
            provider("cheap", 0.0001),
        ]);

        // Build observed throughput for the bound provider: 100 messages
        // over one closed window.
        for _ in 0..100 {
            orchestrator.registry.record_success("expensive");
        }
        std::thread::sleep(Duration::from_millis(20));
        let _ = orchestrator.registry.tick();

        let (target, savings) = orchestrator
            .find_cheaper_provider(
                InstrumentClass::StockQuotes,
                "expensive",
                &CostOptimizationSettings::default(),
            )
            .unwrap();
        assert_eq!(target, "cheap");
        assert!(savings >= 5.0);
    }

    #[test]
    fn cheaper_provider_respects_health_bar() {
        let orchestrator = orchestrator_with(vec![
            provider("expensive", 0.01),
            provider("cheap", 0.0001),
        ]);

        for _ in 0..100 {
            orchestrator.registry.record_success("expensive");
        }
        std::thread::sleep(Duration::from_millis(20));

        // Make the cheap provider unhealthy before the tick.
        orchestrator.registry.record_latency("cheap", 500.0);
        let _ = orchestrator.registry.tick();

        let result = orchestrator.find_cheaper_provider(
            InstrumentClass::StockQuotes,
            "expensive",
            &CostOptimizationSettings::default(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn savings_below_threshold_do_not_switch() {
        let orchestrator = orchestrator_with(vec![
            provider("current", 0.0001),
            provider("same-price", 0.0001),
        ]);

        for _ in 0..10 {
            orchestrator.registry.record_success("current");
        }
        std::thread::sleep(Duration::from_millis(20));
        let _ = orchestrator.registry.tick();

        // Equal costs project zero savings, under any threshold.
        let settings = CostOptimizationSettings::default();
        let result =
            orchestrator.find_cheaper_provider(InstrumentClass::StockQuotes, "current", &settings);
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn snapshot_reflects_registry_and_subscriptions() {
        let orchestrator = orchestrator_with(vec![provider("alpha", 0.0001)]);
        orchestrator
            .subscribe("AAPL", InstrumentClass::StockQuotes)
            .unwrap();

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.providers.len(), 1);
        assert_eq!(snapshot.subscriptions.len(), 1);
        assert_eq!(snapshot.subscriptions[0].instrument, "AAPL");

        orchestrator.shutdown();
    }
}
