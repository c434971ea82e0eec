mod common;

use anyhow::Result;
use balance_ledger::broker::consumer::{ConsumeError, handle_message};
use balance_ledger::broker::{Message, NEW_TRANSACTION_KEY, TransactionAccepted};
use balance_ledger::error::AppError;
use balance_ledger::models::report::ReportQuery;
use chrono::{DateTime, TimeZone, Utc};
use common::test_stats;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn accepted(service_id: Uuid, amount: Decimal) -> TransactionAccepted {
    TransactionAccepted {
        transaction_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        amount,
        service_id,
        order_id: Uuid::new_v4(),
    }
}

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn test_report_sums_one_service_month() -> Result<()> {
    let (_store, stats) = test_stats();
    let service_id = Uuid::new_v4();

    stats
        .record_transaction(&accepted(service_id, dec!(30)), at(2022, 11, 1))
        .await?;
    stats
        .record_transaction(&accepted(service_id, dec!(100)), at(2022, 11, 30))
        .await?;
    // Different month and different service are excluded.
    stats
        .record_transaction(&accepted(service_id, dec!(7)), at(2022, 12, 1))
        .await?;
    stats
        .record_transaction(&accepted(Uuid::new_v4(), dec!(9)), at(2022, 11, 15))
        .await?;

    let reports = stats
        .report(ReportQuery {
            service_id,
            month: 11,
            year: 2022,
        })
        .await?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].service_id, service_id);
    assert_eq!(reports[0].amount, dec!(130));

    Ok(())
}

#[tokio::test]
async fn test_empty_report_is_not_an_error() -> Result<()> {
    let (_store, stats) = test_stats();

    let reports = stats
        .report(ReportQuery {
            service_id: Uuid::new_v4(),
            month: 1,
            year: 2023,
        })
        .await?;
    assert!(reports.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_month_out_of_range_is_rejected() -> Result<()> {
    let (_store, stats) = test_stats();

    for month in [0, 13] {
        let result = stats
            .report(ReportQuery {
                service_id: Uuid::new_v4(),
                month,
                year: 2022,
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    Ok(())
}

#[tokio::test]
async fn test_redelivered_event_is_recorded_once() -> Result<()> {
    let (store, stats) = test_stats();
    let service_id = Uuid::new_v4();
    let event = accepted(service_id, dec!(25));
    let body = Message::new(NEW_TRANSACTION_KEY, event).encode()?;

    handle_message(&body, &stats).await?;
    handle_message(&body, &stats).await?;
    assert_eq!(store.len().await, 1);

    let now = Utc::now();
    let reports = stats
        .report(ReportQuery {
            service_id,
            month: chrono::Datelike::month(&now),
            year: chrono::Datelike::year(&now),
        })
        .await?;
    assert_eq!(reports[0].amount, dec!(25));

    Ok(())
}

#[tokio::test]
async fn test_malformed_message_is_a_decode_error() -> Result<()> {
    let (store, stats) = test_stats();

    let not_json = handle_message(b"not json", &stats).await;
    assert!(matches!(not_json, Err(ConsumeError::Decode(_))));

    let bad_field = br#"{
        "data": {
            "transaction_id": "6f1c2c38-64c4-4a8f-9d0a-0f3c1f2d7a11",
            "user_id": "0b8a8f2e-0c55-4d8e-9a38-1b2f7c9d4e22",
            "amount": "thirty",
            "service_id": "9d2e6a1c-3f4b-4c5d-8e7f-2a1b3c4d5e33",
            "order_id": "4c3b2a19-8d7e-4f6a-b5c4-d3e2f1a0b944"
        },
        "timestamp": "2022-11-01T10:00:00Z",
        "key": "new-transaction"
    }"#;
    let result = handle_message(bad_field, &stats).await;
    assert!(matches!(result, Err(ConsumeError::Decode(_))));
    assert_eq!(store.len().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_unhandled_key_is_ignored() -> Result<()> {
    let (store, stats) = test_stats();
    let body = Message::new("balance-changed", serde_json::json!({ "anything": 1 })).encode()?;

    handle_message(&body, &stats).await?;
    assert_eq!(store.len().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_event_timestamp_dates_the_row() -> Result<()> {
    let (_store, stats) = test_stats();
    let service_id = Uuid::new_v4();
    let body = br#"{
        "data": {
            "transaction_id": "6f1c2c38-64c4-4a8f-9d0a-0f3c1f2d7a11",
            "user_id": "0b8a8f2e-0c55-4d8e-9a38-1b2f7c9d4e22",
            "amount": 12.5,
            "service_id": "SERVICE",
            "order_id": "4c3b2a19-8d7e-4f6a-b5c4-d3e2f1a0b944"
        },
        "timestamp": "2021-03-15T08:30:00Z",
        "key": "new-transaction"
    }"#;
    let body = std::str::from_utf8(body)?.replace("SERVICE", &service_id.to_string());

    handle_message(body.as_bytes(), &stats).await?;

    let reports = stats
        .report(ReportQuery {
            service_id,
            month: 3,
            year: 2021,
        })
        .await?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].amount, dec!(12.5));

    Ok(())
}

#[tokio::test]
async fn test_out_of_range_amount_is_not_recorded() -> Result<()> {
    let (store, stats) = test_stats();

    for amount in [dec!(-5), Decimal::MAX.trunc()] {
        let body = Message::new(NEW_TRANSACTION_KEY, accepted(Uuid::new_v4(), amount)).encode()?;
        let result = handle_message(&body, &stats).await;
        assert!(matches!(
            result,
            Err(ConsumeError::Process(AppError::Validation(_)))
        ));
    }
    assert!(store.is_empty().await);

    Ok(())
}
