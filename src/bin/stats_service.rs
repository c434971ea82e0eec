//! Statistics service entry point.
//!
//! Runs the queue consumer and the report API side by side. Both stop on the
//! same shutdown signal, each within the configured grace period. If the
//! consumer dies first, the API is stopped too and the process exits with an
//! error so a supervisor can restart it.

use std::sync::Arc;

use balance_ledger::{
    app::{self, StatsState},
    broker::Consumer,
    config::Config,
    db, init_tracing,
    repository::postgres::PgStatsStore,
    services::stats_service::StatsService,
    shutdown_signal,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level);
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(
        &config.database_url,
        config.database_max_connections,
        config.connect_timeout(),
    )
    .await?;
    db::run_stats_migrations(&pool).await?;
    tracing::info!("Database ready");

    let stats = StatsService::new(Arc::new(PgStatsStore::new(pool.clone())));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_tx.send_replace(true);
    });

    let consumer = Consumer::connect(&config.rabbitmq_dsn, &config.rabbitmq_queue, stats.clone()).await?;
    let consumer = tokio::spawn(consumer.run(shutdown_rx, config.shutdown_timeout()));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    let outcome = app::serve_with_worker(
        listener,
        app::stats_router(StatsState { stats }),
        shutdown_tx,
        config.shutdown_timeout(),
        consumer,
    )
    .await;

    pool.close().await;
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "Stats service stopped with error");
    }
    outcome?;
    tracing::info!("Stats service stopped");

    Ok(())
}
