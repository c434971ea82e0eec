//! Router assembly for both services.
//!
//! Every request gets an `x-request-id` (generated when the client did not
//! send one), is traced, and carries the id back on the response.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    routing::{get, post},
};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    handlers::{
        accounts,
        health::{self, HealthProbe},
        products, reports, reservations, transactions,
    },
    services::{
        ledger_service::LedgerService, product_service::ProductService,
        stats_service::StatsService, transaction_service::TransactionService,
    },
};

/// Shared state of the balance service.
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerService,
    pub transactions: TransactionService,
    pub products: ProductService,
}

#[async_trait]
impl HealthProbe for AppState {
    async fn ping(&self) -> Result<(), AppError> {
        self.ledger.store().ping().await
    }
}

/// Shared state of the statistics service.
#[derive(Clone)]
pub struct StatsState {
    pub stats: StatsService,
}

#[async_trait]
impl HealthProbe for StatsState {
    async fn ping(&self) -> Result<(), AppError> {
        self.stats.store().ping().await
    }
}

/// Routes of the balance service.
pub fn balance_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/balance", post(accounts::create_account))
        // GET takes a user id, PUT a balance id.
        .route(
            "/balance/{id}",
            get(accounts::get_balance).put(accounts::update_balance),
        )
        .route("/balance/{id}/deposit", post(accounts::deposit))
        .route("/balance/{id}/withdraw", post(accounts::withdraw))
        .route("/balance/{id}/operations", get(accounts::history))
        .route("/transfer", post(accounts::transfer))
        .route("/products", post(products::create_product))
        .route("/products/{product_id}", get(products::get_product))
        .route("/reservation", post(reservations::reserve))
        .route("/reservation/revenue", post(reservations::revenue))
        .route("/reservation/refund", post(reservations::refund))
        .route("/transaction", post(transactions::create_transaction))
        .route(
            "/transaction/{transaction_id}",
            get(transactions::get_transaction).put(transactions::update_transaction),
        )
        .route(
            "/transaction/user/{user_id}",
            get(transactions::list_user_transactions),
        );

    with_layers(
        Router::new()
            .route("/health", get(health::health_check::<AppState>))
            .route("/ready", get(health::ready))
            .nest("/api/v1", api)
            .with_state(state),
    )
}

/// Routes of the statistics service.
pub fn stats_router(state: StatsState) -> Router {
    with_layers(
        Router::new()
            .route("/health", get(health::health_check::<StatsState>))
            .route("/ready", get(health::ready))
            .route("/api/v1/report", get(reports::get_report))
            .with_state(state),
    )
}

fn with_layers(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

/// Serve `router` until `shutdown` turns true, then give in-flight requests
/// `grace` to finish before the server task is aborted.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> std::io::Result<()> {
    let mut server_shutdown = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let mut deadline = shutdown;
    let grace_elapsed = async move {
        let _ = deadline.wait_for(|stop| *stop).await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        joined = &mut server => joined.map_err(std::io::Error::other)?,
        _ = grace_elapsed => {
            server.abort();
            tracing::error!(?grace, "HTTP server did not drain in time");
            Ok(())
        }
    }
}

/// Serve `router` next to a background `worker` that stops on the same
/// `shutdown` channel.
///
/// Whichever side ends first brings the other one down. A worker that ends
/// before shutdown was requested is an error even when it returned `Ok`.
pub async fn serve_with_worker<E>(
    listener: TcpListener,
    router: Router,
    shutdown: watch::Sender<bool>,
    grace: Duration,
    mut worker: JoinHandle<Result<(), E>>,
) -> anyhow::Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let server = serve(listener, router, shutdown.subscribe(), grace);
    tokio::pin!(server);

    tokio::select! {
        served = &mut server => {
            shutdown.send_replace(true);
            let finished = worker.await?;
            served?;
            finished?;
            Ok(())
        }
        finished = &mut worker => {
            let requested = shutdown.send_replace(true);
            if !requested {
                tracing::error!("background worker stopped early, shutting down HTTP server");
            }
            server.await?;
            finished??;
            if !requested {
                anyhow::bail!("background worker stopped before shutdown was requested");
            }
            Ok(())
        }
    }
}
