//! Work-queue consumer for the statistics service.
//!
//! Deliveries are pulled one at a time (prefetch 1) and each is processed on
//! its own task. A delivery is acknowledged only after it has been handled:
//!
//! - handled (or ignored key) → ack
//! - body or payload does not decode → reject, not requeued
//! - storage failed → nack, requeued unless it was already a redelivery
//!
//! On shutdown the consumer stops taking new deliveries, waits for the
//! in-flight ones (bounded), and only then closes the channel and connection.

use std::time::Duration;

use futures_util::StreamExt;
use lapin::{
    Channel, Connection, ConnectionProperties,
    message::Delivery,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicQosOptions, BasicRejectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tokio::{sync::watch, task::JoinSet};

use super::{BrokerError, NEW_TRANSACTION_KEY, RawMessage, TransactionAccepted};
use crate::{error::AppError, services::stats_service::StatsService};

const CONSUMER_TAG: &str = "stats-service";

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("processing failed: {0}")]
    Process(#[from] AppError),
}

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Reject,
    Nack { requeue: bool },
}

impl Disposition {
    pub fn for_outcome(outcome: &Result<(), ConsumeError>, redelivered: bool) -> Self {
        match outcome {
            Ok(()) => Disposition::Ack,
            Err(ConsumeError::Decode(_) | ConsumeError::Process(AppError::Validation(_))) => {
                Disposition::Reject
            }
            Err(ConsumeError::Process(_)) => Disposition::Nack {
                requeue: !redelivered,
            },
        }
    }
}

/// Decode one delivery body and apply it.
pub async fn handle_message(body: &[u8], stats: &StatsService) -> Result<(), ConsumeError> {
    let message = RawMessage::decode(body)?;

    match message.key.as_str() {
        NEW_TRANSACTION_KEY => {
            let event: TransactionAccepted = message.payload()?;
            stats.record_transaction(&event, message.timestamp).await?;
        }
        other => tracing::warn!(key = other, "ignoring message with unhandled key"),
    }

    Ok(())
}

pub struct Consumer {
    connection: Connection,
    channel: Channel,
    queue: String,
    stats: StatsService,
}

impl Consumer {
    pub async fn connect(dsn: &str, queue: &str, stats: StatsService) -> Result<Self, BrokerError> {
        let connection = Connection::connect(dsn, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel.basic_qos(1, BasicQosOptions::default()).await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::info!(queue, "consumer connected");

        Ok(Self {
            connection,
            channel,
            queue: queue.to_string(),
            stats,
        })
    }

    /// Consume until `shutdown` flips (or its sender is dropped).
    ///
    /// # Errors
    ///
    /// - `Amqp`: the delivery stream failed
    /// - `ShutdownTimeout`: in-flight deliveries did not finish within
    ///   `drain_timeout`; they are aborted and left unacknowledged
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        drain_timeout: Duration,
    ) -> Result<(), BrokerError> {
        let mut deliveries = self
            .channel
            .basic_consume(
                &self.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let mut in_flight = JoinSet::new();
        let mut failure = None;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "delivery task panicked");
                    }
                }
                delivery = deliveries.next() => match delivery {
                    Some(Ok(delivery)) => {
                        let stats = self.stats.clone();
                        in_flight.spawn(async move { process(delivery, &stats).await });
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "delivery stream failed");
                        failure = Some(BrokerError::Amqp(e));
                        break;
                    }
                    None => {
                        tracing::warn!("delivery stream closed by broker");
                        break;
                    }
                },
            }
        }

        tracing::info!(in_flight = in_flight.len(), "consumer stopping");

        if failure.is_none() {
            if let Err(e) = self
                .channel
                .basic_cancel(CONSUMER_TAG, BasicCancelOptions::default())
                .await
            {
                tracing::warn!(error = %e, "failed to cancel consumer");
            }
        }

        let drained = tokio::time::timeout(drain_timeout, async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "delivery task panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            let remaining = in_flight.len();
            in_flight.abort_all();
            tracing::error!(remaining, "consumer shutdown timed out");
            failure.get_or_insert(BrokerError::ShutdownTimeout(remaining));
        }

        if let Err(e) = self.channel.close(200, "consumer shutdown").await {
            tracing::warn!(error = %e, "failed to close channel");
        }
        if let Err(e) = self.connection.close(200, "consumer shutdown").await {
            tracing::warn!(error = %e, "failed to close connection");
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn process(delivery: Delivery, stats: &StatsService) {
    let outcome = handle_message(&delivery.data, stats).await;
    let disposition = Disposition::for_outcome(&outcome, delivery.redelivered);

    if let Err(e) = &outcome {
        tracing::error!(error = %e, ?disposition, "failed to handle delivery");
    }

    let settled = match disposition {
        Disposition::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
        Disposition::Reject => {
            delivery
                .acker
                .reject(BasicRejectOptions { requeue: false })
                .await
        }
        Disposition::Nack { requeue } => {
            delivery
                .acker
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue,
                })
                .await
        }
    };

    if let Err(e) = settled {
        tracing::error!(error = %e, "failed to settle delivery");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_error() -> ConsumeError {
        ConsumeError::Decode(serde_json::from_str::<RawMessage>("{").unwrap_err())
    }

    #[test]
    fn success_is_acked() {
        assert_eq!(Disposition::for_outcome(&Ok(()), false), Disposition::Ack);
    }

    #[test]
    fn decode_failures_are_rejected_even_on_first_delivery() {
        assert_eq!(
            Disposition::for_outcome(&Err(decode_error()), false),
            Disposition::Reject
        );
    }

    #[test]
    fn invalid_events_are_rejected() {
        let invalid = Err(ConsumeError::Process(AppError::Validation(
            "amount is out of range".to_string(),
        )));

        assert_eq!(Disposition::for_outcome(&invalid, false), Disposition::Reject);
    }

    #[test]
    fn processing_failures_are_requeued_once() {
        let failed = Err(ConsumeError::Process(AppError::Storage("down".to_string())));

        assert_eq!(
            Disposition::for_outcome(&failed, false),
            Disposition::Nack { requeue: true }
        );
        assert_eq!(
            Disposition::for_outcome(&failed, true),
            Disposition::Nack { requeue: false }
        );
    }
}
