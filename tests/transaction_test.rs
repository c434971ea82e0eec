mod common;

use anyhow::Result;
use balance_ledger::broker::{NEW_TRANSACTION_KEY, TransactionAccepted};
use balance_ledger::error::AppError;
use balance_ledger::models::operation::OperationType;
use balance_ledger::models::reservation::{NewReservation, ReservationRef};
use balance_ledger::models::transaction::{NewTransaction, TransactionStatus};
use balance_ledger::repository::ReservationStore;
use common::{TestLedger, new_transaction};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn test_end_to_end_accept_and_refund() -> Result<()> {
    let mut ledger = TestLedger::new();
    let account = ledger.funded_account(dec!(100)).await?;

    // Creating a transaction reserves its amount.
    let transaction = ledger
        .transactions
        .create(new_transaction(account.user_id, dec!(30)))
        .await?;
    assert_eq!(transaction.status, TransactionStatus::Processed);

    let held = ledger.ledger.account_by_id(account.id).await?;
    assert_eq!(held.free, dec!(70));
    assert_eq!(held.reserved, dec!(30));

    // Accepting publishes exactly one event.
    let accepted = ledger
        .transactions
        .update_status(transaction.id, "accepted")
        .await?;
    assert_eq!(accepted.status, TransactionStatus::Accepted);

    let event = ledger.next_event().await?;
    assert_eq!(event.key, NEW_TRANSACTION_KEY);
    let payload: TransactionAccepted = event.payload()?;
    assert_eq!(payload.transaction_id, transaction.id);
    assert_eq!(payload.user_id, account.user_id);
    assert_eq!(payload.amount, dec!(30));
    assert_eq!(payload.service_id, transaction.service_id);
    assert_eq!(payload.order_id, transaction.order_id);
    assert!(ledger.no_more_events().await);

    // The accepted amount is consumed, not returned.
    let settled = ledger.ledger.account_by_id(account.id).await?;
    assert_eq!(settled.free, dec!(70));
    assert_eq!(settled.reserved, Decimal::ZERO);

    // A second pending transaction is refunded through its reservation.
    let pending = ledger
        .transactions
        .create(new_transaction(account.user_id, dec!(30)))
        .await?;
    assert_eq!(ledger.ledger.account_by_id(account.id).await?.free, dec!(40));

    ledger
        .ledger
        .refund(ReservationRef::OrderId(pending.order_id))
        .await?;
    let refunded = ledger.ledger.account_by_id(account.id).await?;
    assert_eq!(refunded.free, dec!(70));
    assert_eq!(refunded.reserved, Decimal::ZERO);

    Ok(())
}

#[tokio::test]
async fn test_create_without_funds_leaves_nothing_behind() -> Result<()> {
    let ledger = TestLedger::new();
    let account = ledger.funded_account(dec!(10)).await?;

    let result = ledger
        .transactions
        .create(new_transaction(account.user_id, dec!(10.01)))
        .await;
    assert!(matches!(result, Err(AppError::InsufficientBalance)));

    assert!(
        ledger
            .transactions
            .list_by_user(account.user_id)
            .await?
            .is_empty()
    );
    assert!(ledger.store.all_reservations().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_create_for_user_without_account_is_not_found() -> Result<()> {
    let ledger = TestLedger::new();

    let result = ledger
        .transactions
        .create(new_transaction(Uuid::new_v4(), dec!(1)))
        .await;
    assert!(matches!(result, Err(AppError::NotFound("account"))));

    Ok(())
}

#[tokio::test]
async fn test_terminal_status_cannot_change() -> Result<()> {
    let mut ledger = TestLedger::new();
    let account = ledger.funded_account(dec!(50)).await?;
    let transaction = ledger
        .transactions
        .create(new_transaction(account.user_id, dec!(20)))
        .await?;

    ledger
        .transactions
        .update_status(transaction.id, "rejected")
        .await?;

    for next in ["processed", "accepted", "rejected"] {
        let result = ledger.transactions.update_status(transaction.id, next).await;
        assert!(
            matches!(result, Err(AppError::InvalidStatusTransition { .. })),
            "rejected -> {next} must fail"
        );
    }

    let stored = ledger.transactions.get(transaction.id).await?;
    assert_eq!(stored.status, TransactionStatus::Rejected);

    // Rejecting refunds, and no event is published for it.
    let account = ledger.ledger.account_by_id(account.id).await?;
    assert_eq!(account.free, dec!(50));
    assert_eq!(account.reserved, Decimal::ZERO);
    assert!(ledger.no_more_events().await);

    Ok(())
}

#[tokio::test]
async fn test_processed_to_processed_is_rejected() -> Result<()> {
    let ledger = TestLedger::new();
    let account = ledger.funded_account(dec!(50)).await?;
    let transaction = ledger
        .transactions
        .create(new_transaction(account.user_id, dec!(20)))
        .await?;

    let result = ledger
        .transactions
        .update_status(transaction.id, "pending")
        .await;
    assert!(matches!(
        result,
        Err(AppError::InvalidStatusTransition {
            from: TransactionStatus::Processed,
            to: TransactionStatus::Processed
        })
    ));

    let unknown = ledger
        .transactions
        .update_status(transaction.id, "shipped")
        .await;
    assert!(matches!(unknown, Err(AppError::Validation(_))));

    Ok(())
}

#[tokio::test]
async fn test_publish_failure_does_not_fail_the_update() -> Result<()> {
    let ledger = TestLedger::with_failing_publisher();
    let account = ledger.funded_account(dec!(50)).await?;
    let transaction = ledger
        .transactions
        .create(new_transaction(account.user_id, dec!(20)))
        .await?;

    let accepted = ledger
        .transactions
        .update_status(transaction.id, "accepted")
        .await?;
    assert_eq!(accepted.status, TransactionStatus::Accepted);
    assert_eq!(
        ledger.transactions.get(transaction.id).await?.status,
        TransactionStatus::Accepted
    );

    Ok(())
}

#[tokio::test]
async fn test_failed_status_update_rolls_back() -> Result<()> {
    let ledger = TestLedger::new();
    let account = ledger.funded_account(dec!(50)).await?;
    let transaction = ledger
        .transactions
        .create(new_transaction(account.user_id, dec!(20)))
        .await?;

    ledger.store.fail_operation_log(true);
    let result = ledger
        .transactions
        .update_status(transaction.id, "rejected")
        .await;
    ledger.store.fail_operation_log(false);
    assert!(matches!(result, Err(AppError::Storage(_))));

    let stored = ledger.transactions.get(transaction.id).await?;
    assert_eq!(stored.status, TransactionStatus::Processed);
    assert_eq!(ledger.store.all_reservations().await.len(), 1);

    let operations = ledger.store.all_operations().await;
    assert!(
        !operations
            .iter()
            .any(|op| op.operation_type == OperationType::Refund)
    );

    Ok(())
}

#[tokio::test]
async fn test_list_by_user_returns_only_that_users_transactions() -> Result<()> {
    let ledger = TestLedger::new();
    let alice = ledger.funded_account(dec!(100)).await?;
    let bob = ledger.funded_account(dec!(100)).await?;

    ledger
        .transactions
        .create(new_transaction(alice.user_id, dec!(10)))
        .await?;
    ledger
        .transactions
        .create(new_transaction(alice.user_id, dec!(15)))
        .await?;
    ledger
        .transactions
        .create(new_transaction(bob.user_id, dec!(5)))
        .await?;

    let listed = ledger.transactions.list_by_user(alice.user_id).await?;
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|t| t.user_id == alice.user_id));

    Ok(())
}

#[tokio::test]
async fn test_status_update_settles_only_its_own_reservation() -> Result<()> {
    let ledger = TestLedger::new();
    let alice = ledger.funded_account(dec!(100)).await?;
    let bob = ledger.funded_account(dec!(100)).await?;

    let transaction = ledger
        .transactions
        .create(new_transaction(alice.user_id, dec!(30)))
        .await?;
    ledger
        .ledger
        .refund(ReservationRef::OrderId(transaction.order_id))
        .await?;

    // The order id is free for reservations again once settled.
    ledger
        .ledger
        .reserve(NewReservation {
            account_id: bob.id,
            product_id: Uuid::new_v4(),
            order_id: transaction.order_id,
            amount: dec!(50),
        })
        .await?;

    ledger
        .transactions
        .update_status(transaction.id, "accepted")
        .await?;

    let alice = ledger.ledger.account_by_id(alice.id).await?;
    assert_eq!(alice.free, dec!(100));
    assert_eq!(alice.reserved, Decimal::ZERO);

    let bob = ledger.ledger.account_by_id(bob.id).await?;
    assert_eq!(bob.free, dec!(50));
    assert_eq!(bob.reserved, dec!(50));

    let remaining = ledger
        .store
        .reservation(ReservationRef::OrderId(transaction.order_id))
        .await?
        .expect("bob's reservation is untouched");
    assert_eq!(remaining.account_id, bob.id);
    assert_eq!(remaining.amount, dec!(50));
    assert_eq!(remaining.transaction_id, None);

    Ok(())
}

#[tokio::test]
async fn test_order_id_belongs_to_one_transaction() -> Result<()> {
    let ledger = TestLedger::new();
    let account = ledger.funded_account(dec!(100)).await?;

    let first = ledger
        .transactions
        .create(new_transaction(account.user_id, dec!(10)))
        .await?;
    let linked = ledger
        .store
        .reservation(ReservationRef::TransactionId(first.id))
        .await?
        .expect("creating a transaction opens its reservation");
    assert_eq!(linked.order_id, first.order_id);
    assert_eq!(linked.transaction_id, Some(first.id));

    let duplicate = ledger
        .transactions
        .create(NewTransaction {
            order_id: first.order_id,
            ..new_transaction(account.user_id, dec!(20))
        })
        .await;
    assert!(matches!(duplicate, Err(AppError::Validation(_))));

    let after = ledger.ledger.account_by_id(account.id).await?;
    assert_eq!(after.free, dec!(90));
    assert_eq!(after.reserved, dec!(10));
    assert_eq!(
        ledger
            .transactions
            .list_by_user(account.user_id)
            .await?
            .len(),
        1
    );

    Ok(())
}
