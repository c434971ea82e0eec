//! Balance service entry point.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Initialize logging
//! 3. Create database connection pool and run migrations
//! 4. Connect the event publisher
//! 5. Build HTTP router and serve until a shutdown signal
//! 6. Drain requests (bounded), then close the broker connection

use std::sync::Arc;

use balance_ledger::{
    app::{self, AppState},
    broker::AmqpPublisher,
    config::Config,
    db, init_tracing,
    repository::{LedgerStore, postgres::PgLedgerStore},
    services::{
        ledger_service::LedgerService, product_service::ProductService,
        transaction_service::TransactionService,
    },
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
    tracing::info!("Database pool created");

    db::run_balance_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let publisher = Arc::new(
        AmqpPublisher::connect(
            &config.rabbitmq_dsn,
            &config.rabbitmq_queue,
            &config.broadcast_exchange,
            config.publish_timeout(),
        )
        .await?,
    );

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool.clone()));
    let state = AppState {
        ledger: LedgerService::new(Arc::clone(&store)),
        products: ProductService::new(Arc::clone(&store)),
        transactions: TransactionService::new(store, publisher.clone()),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    app::serve(
        listener,
        app::balance_router(state),
        shutdown_rx,
        config.shutdown_timeout(),
    )
    .await?;

    if let Err(e) = publisher.close().await {
        tracing::warn!(error = %e, "failed to close publisher");
    }
    pool.close().await;
    tracing::info!("Balance service stopped");

    Ok(())
}
