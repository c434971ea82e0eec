//! Message broker plumbing (AMQP via `lapin`).
//!
//! The balance service publishes an event whenever a transaction is accepted;
//! the statistics service consumes those events from the same durable work
//! queue.

pub mod consumer;
pub mod message;
pub mod publisher;

pub use consumer::{Consumer, Disposition};
pub use message::{Message, NEW_TRANSACTION_KEY, RawMessage, TransactionAccepted};
pub use publisher::{AmqpPublisher, EventPublisher};

/// Broker-side failures.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("broker operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0} in-flight deliveries still running after the shutdown timeout")]
    ShutdownTimeout(usize),
}
