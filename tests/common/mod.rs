// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use balance_ledger::app::{AppState, StatsState};
use balance_ledger::broker::{BrokerError, EventPublisher, RawMessage};
use balance_ledger::error::AppError;
use balance_ledger::models::account::{Account, CreateAccountRequest};
use balance_ledger::models::reservation::NewReservation;
use balance_ledger::models::transaction::NewTransaction;
use balance_ledger::repository::memory::{MemoryLedgerStore, MemoryStatsStore};
use balance_ledger::services::ledger_service::LedgerService;
use balance_ledger::services::product_service::ProductService;
use balance_ledger::services::stats_service::StatsService;
use balance_ledger::services::transaction_service::TransactionService;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Publisher that forwards every pushed message to a channel.
pub struct RecordingPublisher {
    sent: mpsc::UnboundedSender<RawMessage>,
}

impl RecordingPublisher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RawMessage>) {
        let (sent, events) = mpsc::unbounded_channel();
        (Arc::new(Self { sent }), events)
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn push(&self, message: &RawMessage) -> Result<(), BrokerError> {
        let _ = self.sent.send(message.clone());
        Ok(())
    }
}

/// Publisher whose broker is always unreachable.
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn push(&self, _message: &RawMessage) -> Result<(), BrokerError> {
        Err(BrokerError::Timeout(Duration::from_secs(5)))
    }
}

/// Everything a balance-service test needs, backed by memory.
pub struct TestLedger {
    pub store: Arc<MemoryLedgerStore>,
    pub ledger: LedgerService,
    pub transactions: TransactionService,
    pub products: ProductService,
    pub events: mpsc::UnboundedReceiver<RawMessage>,
}

impl TestLedger {
    pub fn new() -> Self {
        let (publisher, events) = RecordingPublisher::new();
        Self::with_publisher(publisher, events)
    }

    /// Ledger whose publisher always fails; `events` is already closed.
    pub fn with_failing_publisher() -> Self {
        let (_sent, events) = mpsc::unbounded_channel();
        Self::with_publisher(Arc::new(FailingPublisher), events)
    }

    fn with_publisher(
        publisher: Arc<dyn EventPublisher>,
        events: mpsc::UnboundedReceiver<RawMessage>,
    ) -> Self {
        let store = Arc::new(MemoryLedgerStore::new());
        Self {
            ledger: LedgerService::new(store.clone()),
            transactions: TransactionService::new(store.clone(), publisher),
            products: ProductService::new(store.clone()),
            store,
            events,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            ledger: self.ledger.clone(),
            transactions: self.transactions.clone(),
            products: self.products.clone(),
        }
    }

    /// Open an account for a fresh user with `free` funds.
    pub async fn funded_account(&self, free: Decimal) -> Result<Account> {
        let account = self
            .ledger
            .create_account(CreateAccountRequest {
                user_id: Uuid::new_v4(),
                free,
                reserved: Decimal::ZERO,
            })
            .await?;
        Ok(account)
    }

    /// Wait for the next published event.
    pub async fn next_event(&mut self) -> Result<RawMessage> {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .map_err(|_| anyhow!("no event published within 2s"))?
            .ok_or_else(|| anyhow!("event channel closed"))
    }

    /// True when nothing else gets published within a short window.
    pub async fn no_more_events(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(200), self.events.recv())
            .await
            .is_err()
    }
}

pub fn new_transaction(user_id: Uuid, amount: Decimal) -> NewTransaction {
    NewTransaction {
        user_id,
        order_id: Uuid::new_v4(),
        service_id: Uuid::new_v4(),
        amount,
    }
}

pub fn test_stats() -> (Arc<MemoryStatsStore>, StatsService) {
    let store = Arc::new(MemoryStatsStore::new());
    (store.clone(), StatsService::new(store))
}

pub fn stats_state(stats: &StatsService) -> StatsState {
    StatsState {
        stats: stats.clone(),
    }
}

/// How a batch of concurrent attempts ended.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RaceOutcome {
    pub succeeded: usize,
    pub insufficient: usize,
}

async fn collect_race<T: Send + 'static>(
    mut tasks: JoinSet<Result<T, AppError>>,
) -> Result<RaceOutcome> {
    let mut outcome = RaceOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(_) => outcome.succeeded += 1,
            Err(AppError::InsufficientBalance) => outcome.insufficient += 1,
            Err(e) => return Err(anyhow!("unexpected failure: {e}")),
        }
    }
    Ok(outcome)
}

/// Fire `attempts` withdrawals of `amount` at one account at the same time.
pub async fn race_withdrawals(
    ledger: &LedgerService,
    account_id: Uuid,
    amount: Decimal,
    attempts: usize,
) -> Result<RaceOutcome> {
    let mut tasks = JoinSet::new();
    for _ in 0..attempts {
        let ledger = ledger.clone();
        tasks.spawn(async move { ledger.withdraw(account_id, amount).await });
    }
    collect_race(tasks).await
}

/// Fire `attempts` reservations and `attempts` transfers to `to_account_id`,
/// all of `amount` and all drawing on `account_id`, at the same time.
pub async fn race_reserves_and_transfers(
    ledger: &LedgerService,
    account_id: Uuid,
    to_account_id: Uuid,
    amount: Decimal,
    attempts: usize,
) -> Result<RaceOutcome> {
    let mut tasks = JoinSet::new();
    for _ in 0..attempts {
        let reserving = ledger.clone();
        tasks.spawn(async move {
            reserving
                .reserve(NewReservation {
                    account_id,
                    product_id: Uuid::new_v4(),
                    order_id: Uuid::new_v4(),
                    amount,
                })
                .await
                .map(|_| ())
        });

        let transferring = ledger.clone();
        tasks.spawn(async move {
            transferring
                .transfer(account_id, to_account_id, amount)
                .await
                .map(|_| ())
        });
    }
    collect_race(tasks).await
}
