//! RFF Relayer - cross-chain request-for-funds service
//!
//! Serves intent quotes and recovery listings, exposes chain health and
//! metrics, and keeps the recovery store reachable for in-flight requests.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rff_relayer::api::{self, AppState};
use rff_relayer::chain::ChainRegistry;
use rff_relayer::config::Settings;
use rff_relayer::fees::ScheduleFeeStore;
use rff_relayer::metrics::{self, MetricsServer};
use rff_relayer::state::{MemoryRecoveryStore, PgRecoveryStore, RecoveryStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting RFF Relayer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains (instance {})",
        settings.enabled_chains().len(),
        settings.relayer.instance_id
    );

    // Recovery store: persisted when a database is configured
    let (store, database): (Arc<dyn RecoveryStore>, Option<Arc<PgRecoveryStore>>) =
        match &settings.database {
            Some(db_config) => {
                let db = Arc::new(PgRecoveryStore::new(db_config).await?);
                info!("Database connection established");
                db.run_migrations().await?;
                let store: Arc<dyn RecoveryStore> = db.clone();
                (store, Some(db))
            }
            None => {
                warn!("No database configured, pending intents are kept in memory");
                let store: Arc<dyn RecoveryStore> = Arc::new(MemoryRecoveryStore::new());
                (store, None)
            }
        };
    let pending = metrics::seed_pending_intents(store.as_ref()).await?;
    info!("{} pending intents awaiting fills", pending);

    // Chain registry (providers for all enabled EVM chains)
    let registry = Arc::new(ChainRegistry::new(&settings)?);
    info!("Chain registry initialized");

    let fee_store = Arc::new(ScheduleFeeStore::new(&settings.fees));
    let shutdown = CancellationToken::new();

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState {
            registry: registry.clone(),
            store,
            fee_store,
            database: database.clone(),
        };
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = api::run_server(config, state, shutdown).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Health check loop
    let health_handle = tokio::spawn({
        let registry = registry.clone();
        let database = database.clone();
        let interval = settings.relayer.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

                let mut healthy = true;
                for (chain_id, chain_ok) in registry.health_check().await {
                    if !chain_ok {
                        warn!("Chain {} health check failed", chain_id);
                        healthy = false;
                    }
                }

                if let Some(db) = &database {
                    if let Err(e) = db.health_check().await {
                        warn!("Database health check failed: {}", e);
                        healthy = false;
                    }
                }

                if healthy {
                    metrics::record_health_check();
                } else {
                    metrics::record_health_check_failure();
                }
            }
        }
    });

    info!("RFF Relayer is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    shutdown.cancel();
    if let Err(e) = api_handle.await {
        warn!("API server task ended abnormally: {}", e);
    }

    // Abort background tasks
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("RFF Relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rff_relayer=debug,sqlx=warn,hyper=warn"));

    let json = std::env::var("RFF_RELAYER_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
