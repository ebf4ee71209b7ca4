//! Feed Orchestrator Binary
//!
//! Starts the market data feed orchestration core.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin feed-orchestrator
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FEED_PROVIDERS_PATH`: Path to the JSON provider document
//! - `FEED_CREDENTIAL_<PROVIDER_ID>`: Credential material per provider
//!
//! ## Optional
//! - `FEED_STATUS_PORT`: Status/metrics HTTP port (default: 8080)
//! - `FEED_CONNECT_TIMEOUT_SECS`: Connect + handshake timeout (default: 8)
//! - `FEED_MAX_CONNECT_ATTEMPTS`: Attempts per failover cycle (default: 3)
//! - `FEED_STALENESS_WINDOW_SECS`: No-message staleness window (default: 30)
//! - `FEED_HEALTH_CHECK_INTERVAL_SECS`: Health tick interval (default: 5)
//! - `FEED_COST_OPTIMIZATION_INTERVAL_SECS`: Cost pass interval (default: 30)
//! - `FEED_COST_MIN_DAILY_SAVINGS_USD`: Savings bar for a switch (default: 5.0)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use feed_orchestrator::infrastructure::auth::{EnvCredentialSource, default_authenticators};
use feed_orchestrator::infrastructure::metrics;
use feed_orchestrator::infrastructure::telemetry;
use feed_orchestrator::infrastructure::transport::{WsTransportConfig, WsTransportFactory};
use feed_orchestrator::{
    AnomalyDetector, ConnectionPool, EventBus, FeedOrchestrator, LatencyMonitor,
    OrchestratorSettings, ProviderRegistry, ProvidersDocument, StatusServer, StatusServerState,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Interval between gauge refreshes from orchestrator snapshots.
const GAUGE_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Feed Orchestrator");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let settings = OrchestratorSettings::from_env();
    let document = ProvidersDocument::from_env()?;
    log_config(&settings, &document);

    let shutdown_token = CancellationToken::new();

    // Registry seeded from the provider document, in declaration order.
    let registry = Arc::new(ProviderRegistry::new(settings.health_thresholds));
    for provider in document.providers.clone() {
        registry.register(provider)?;
    }

    // Connection pool over the WebSocket transport factory.
    let factory = WsTransportFactory::new(WsTransportConfig {
        connect_timeout: settings.connect_timeout,
    });
    let pool = Arc::new(ConnectionPool::new(Arc::new(factory)));

    let events = Arc::new(EventBus::new(settings.event_capacity));

    let orchestrator = Arc::new(FeedOrchestrator::new(
        settings.orchestrator_config(),
        Arc::clone(&registry),
        pool,
        Arc::new(EnvCredentialSource::new()),
        default_authenticators(),
        Arc::clone(&events),
        AnomalyDetector::default(),
        LatencyMonitor::new(document.latency_config(settings.alert_cooldown)),
    ));

    orchestrator.start_background_tasks();

    // Fold the event stream into Prometheus counters.
    let mut metrics_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = metrics_rx.recv().await {
            metrics::record_event(&event);
        }
    });

    // Refresh pool/subscription gauges from snapshots.
    let gauge_orchestrator = Arc::clone(&orchestrator);
    let gauge_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(GAUGE_REFRESH_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = gauge_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let snapshot = gauge_orchestrator.snapshot();
                    metrics::set_active_connections(snapshot.pool.active as f64);
                    metrics::set_subscriptions(snapshot.subscriptions.len() as f64);
                }
            }
        }
    });

    // Status server
    let status_state = Arc::new(StatusServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&orchestrator),
    ));
    let status_server = StatusServer::new(
        settings.server.status_port,
        status_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = status_server.run().await {
            tracing::error!(error = %e, "status server error");
        }
    });

    // Startup subscriptions from the provider document.
    for entry in &document.subscriptions {
        if let Err(e) = orchestrator.subscribe(&entry.instrument, entry.class) {
            tracing::error!(
                instrument = %entry.instrument,
                error = %e,
                "startup subscription failed"
            );
        }
    }

    tracing::info!("Feed orchestrator ready");

    await_shutdown(shutdown_token).await;
    orchestrator.shutdown();

    tracing::info!("Feed orchestrator stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(settings: &OrchestratorSettings, document: &ProvidersDocument) {
    tracing::info!(
        status_port = settings.server.status_port,
        providers = document.providers.len(),
        subscriptions = document.subscriptions.len(),
        health_check_secs = settings.health_check_interval.as_secs(),
        cost_optimization_secs = settings.cost_optimization_interval.as_secs(),
        "Configuration loaded"
    );
    for provider in &document.providers {
        tracing::debug!(
            provider = %provider.id,
            endpoint = %provider.endpoint,
            scheme = provider.auth_scheme.as_str(),
            priority = provider.priority.as_str(),
            "Provider configured"
        );
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
