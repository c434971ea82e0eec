//! Queue message envelope and event payloads.
//!
//! ```json
//! {
//!   "data": { "transaction_id": "...", "user_id": "...", "amount": "30.00",
//!             "service_id": "...", "order_id": "..." },
//!   "timestamp": "2022-11-01T10:00:00Z",
//!   "key": "new-transaction"
//! }
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use super::BrokerError;
use crate::models::transaction::Transaction;

/// Routing key of the transaction-accepted event.
pub const NEW_TRANSACTION_KEY: &str = "new-transaction";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub key: String,
}

/// Envelope whose payload has not been matched to a key yet.
pub type RawMessage = Message<serde_json::Value>;

impl<T> Message<T> {
    /// Wrap `data` stamped with the current time.
    pub fn new(key: impl Into<String>, data: T) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
            key: key.into(),
        }
    }
}

impl<T: Serialize> Message<T> {
    pub fn encode(&self) -> Result<Vec<u8>, BrokerError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Erase the payload type so any event fits one publisher interface.
    pub fn into_raw(self) -> Result<RawMessage, BrokerError> {
        Ok(Message {
            data: serde_json::to_value(self.data)?,
            timestamp: self.timestamp,
            key: self.key,
        })
    }
}

impl RawMessage {
    /// Parse a raw delivery body. The payload stays untyped until the key is known.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Decode the payload as `T`; any malformed field fails the whole payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Emitted once when a transaction moves to `accepted`.
///
/// `amount` serializes as a decimal string; a JSON number is accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAccepted {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub service_id: Uuid,
    pub order_id: Uuid,
}

impl From<&Transaction> for TransactionAccepted {
    fn from(transaction: &Transaction) -> Self {
        Self {
            transaction_id: transaction.id,
            user_id: transaction.user_id,
            amount: transaction.amount,
            service_id: transaction.service_id,
            order_id: transaction.order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BODY: &str = r#"{
        "data": {
            "transaction_id": "6f1c2c38-64c4-4a8f-9d0a-0f3c1f2d7a11",
            "user_id": "0b8a8f2e-0c55-4d8e-9a38-1b2f7c9d4e22",
            "amount": 30.5,
            "service_id": "9d2e6a1c-3f4b-4c5d-8e7f-2a1b3c4d5e33",
            "order_id": "4c3b2a19-8d7e-4f6a-b5c4-d3e2f1a0b944"
        },
        "timestamp": "2022-11-01T10:00:00Z",
        "key": "new-transaction"
    }"#;

    #[test]
    fn decodes_numeric_amount() {
        let message = RawMessage::decode(BODY.as_bytes()).unwrap();
        assert_eq!(message.key, NEW_TRANSACTION_KEY);

        let event: TransactionAccepted = message.payload().unwrap();
        assert_eq!(event.amount, dec!(30.5));
    }

    #[test]
    fn malformed_field_fails_the_whole_payload() {
        let body = BODY.replace("0b8a8f2e-0c55-4d8e-9a38-1b2f7c9d4e22", "not-a-uuid");
        let message = RawMessage::decode(body.as_bytes()).unwrap();

        assert!(message.payload::<TransactionAccepted>().is_err());
    }

    #[test]
    fn amount_is_written_as_string() {
        let event = TransactionAccepted {
            transaction_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: dec!(30.00),
            service_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
        };
        let message = Message::new(NEW_TRANSACTION_KEY, event).into_raw().unwrap();

        assert_eq!(message.data["amount"], "30.00");
    }
}
