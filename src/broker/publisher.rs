//! Event publisher.
//!
//! Every event goes to the durable work queue read by the statistics service.
//! Transaction-accepted events are additionally broadcast on a fan-out
//! exchange for live subscribers.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueDeclareOptions},
    types::FieldTable,
};

use super::{BrokerError, NEW_TRANSACTION_KEY, RawMessage};

/// Persistent delivery mode (survives a broker restart).
const PERSISTENT: u8 = 2;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn push(&self, message: &RawMessage) -> Result<(), BrokerError>;
}

pub struct AmqpPublisher {
    connection: Connection,
    channel: Channel,
    queue: String,
    broadcast_exchange: String,
    timeout: Duration,
}

impl AmqpPublisher {
    /// Connect and declare the work queue and the broadcast exchange.
    pub async fn connect(
        dsn: &str,
        queue: &str,
        broadcast_exchange: &str,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let connection = Connection::connect(dsn, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                broadcast_exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

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

        tracing::info!(queue, exchange = broadcast_exchange, "publisher connected");

        Ok(Self {
            connection,
            channel,
            queue: queue.to_string(),
            broadcast_exchange: broadcast_exchange.to_string(),
            timeout,
        })
    }

    async fn send(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into());

        with_timeout(self.timeout, async {
            self.channel
                .basic_publish(
                    exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    body,
                    properties,
                )
                .await?
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn close(&self) -> Result<(), BrokerError> {
        self.channel.close(200, "publisher shutdown").await?;
        self.connection.close(200, "publisher shutdown").await?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for AmqpPublisher {
    async fn push(&self, message: &RawMessage) -> Result<(), BrokerError> {
        let body = message.encode()?;

        // Default exchange routes by queue name.
        self.send("", &self.queue, &body).await?;

        if message.key == NEW_TRANSACTION_KEY {
            self.send(&self.broadcast_exchange, "", &body).await?;
        }

        Ok(())
    }
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, BrokerError>>,
) -> Result<T, BrokerError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| BrokerError::Timeout(limit))?
}
