use anyhow::Context;
use booking_api::{
    app,
    metrics::{Metrics, MetricsPublisher},
    state::{AppState, AuthConfig},
};
use booking_catalog::{HttpInventoryKeeper, HttpUserDirectory};
use booking_core::{
    EventPublisher, LedgerStore, LocalSweepLease, LogPublisher, SweepLease, SystemClock,
};
use booking_ledger::{ExpiryReaper, InventoryCoordinator, ReservationLedger};
use booking_store::{Config, DbClient, EventProducer, PgLedgerStore, RedisSweepLease};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SWEEP_LEASE_KEY: &str = "booking:expiry-sweep";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "booking_api=debug,booking_ledger=debug,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!(port = config.server.port, "starting booking api");

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to Postgres")?;
    db.migrate().await.context("failed to run migrations")?;
    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(db.pool.clone()));

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let sink: Arc<dyn EventPublisher> = match &config.kafka {
        Some(kafka) => Arc::new(
            EventProducer::new(&kafka.brokers).context("failed to create Kafka producer")?,
        ),
        None => {
            tracing::warn!("no kafka configured, reservation events are only logged");
            Arc::new(LogPublisher)
        }
    };
    let publisher: Arc<dyn EventPublisher> = Arc::new(MetricsPublisher::new(sink, metrics.clone()));

    let rules = &config.reservations;
    let policy = rules.policy();

    let keeper = HttpInventoryKeeper::new(&config.services.ticket_url, policy.remote_timeout)
        .context("failed to build ticket service client")?;
    let users = HttpUserDirectory::new(&config.services.auth_url, policy.remote_timeout)
        .context("failed to build auth service client")?;

    let coordinator = Arc::new(InventoryCoordinator::new(
        Arc::new(keeper),
        publisher.clone(),
        policy.remote_timeout,
        policy.release_retry.clone(),
    ));
    let ledger = Arc::new(ReservationLedger::new(
        store,
        Arc::new(users),
        coordinator,
        publisher,
        Arc::new(SystemClock),
        policy,
    ));

    let lease: Arc<dyn SweepLease> = match &config.redis {
        Some(redis) => {
            let lease = RedisSweepLease::new(&redis.url, SWEEP_LEASE_KEY, rules.sweep_lease())
                .context("failed to open Redis client")?;
            lease.ping().await.context("failed to reach Redis")?;
            Arc::new(lease)
        }
        None => Arc::new(LocalSweepLease::new()),
    };
    let reaper = Arc::new(ExpiryReaper::new(ledger.clone(), lease));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sweeper = tokio::spawn(reaper.clone().run(rules.sweep_interval(), shutdown_rx));

    let app_state = AppState {
        ledger,
        reaper,
        metrics,
        auth: AuthConfig { secret: config.auth.jwt_secret.clone() },
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind")?;
    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(());
    let _ = sweeper.await;
    tracing::info!("booking api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
