use std::{future::Future, time::Duration};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, info};

use crate::{
    config::Config,
    error::BrokerError,
    models::status::StatusEvent,
    traits::{JobPublisher, StatusPublisher},
};

const PERSISTENT: u8 = 2;

pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    exchange_name: String,
    push_queue_name: String,
    push_routing_key: String,
    status_routing_key: String,
    publish_timeout: Duration,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        declare_topology(&channel, config).await?;

        info!(
            queue = %config.push_queue_name,
            prefetch = config.prefetch_count,
            "RabbitMQ channel ready"
        );

        Ok(Self {
            connection,
            channel,
            exchange_name: config.exchange_name.clone(),
            push_queue_name: config.push_queue_name.clone(),
            push_routing_key: config.push_routing_key.clone(),
            status_routing_key: config.status_routing_key.clone(),
            publish_timeout: config.request_timeout(),
        })
    }

    /// Manual-ack consumer on the push queue.
    pub async fn create_consumer(&self, consumer_tag: &str) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                &self.push_queue_name,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        info!(consumer_tag, queue = %self.push_queue_name, "Consumer created");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;

        Ok(())
    }

    /// Rejects without requeue so the queue's dead-letter exchange takes the message.
    pub async fn reject(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
            .await?;

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    pub async fn close(&self) -> Result<(), BrokerError> {
        self.channel.close(200, "Worker shutting down").await?;
        self.connection.close(200, "Worker shutting down").await?;
        Ok(())
    }

    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT);

        let confirmation = bounded(self.publish_timeout, async {
            self.channel
                .basic_publish(
                    &self.exchange_name,
                    routing_key,
                    BasicPublishOptions::default(),
                    payload,
                    properties,
                )
                .await?
                .await
        })
        .await?;

        if confirmation.is_nack() {
            return Err(BrokerError::Nacked);
        }

        debug!(exchange = %self.exchange_name, routing_key, "Message published");

        Ok(())
    }
}

async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, BrokerError>
where
    F: Future<Output = Result<T, lapin::Error>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(BrokerError::from),
        Err(_) => Err(BrokerError::Timeout),
    }
}

/// Declares the exchanges and queues the worker relies on.
///
/// The push queue dead-letters into the DLX with routing key `failed`, which
/// lands rejected jobs in the failed queue.
async fn declare_topology(channel: &Channel, config: &Config) -> Result<(), Error> {
    let durable_exchange = || ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    };
    let durable_queue = || QueueDeclareOptions {
        durable: true,
        ..Default::default()
    };

    for exchange in [&config.exchange_name, &config.dlx_name] {
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                durable_exchange(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare exchange '{}': {}", exchange, e))?;
    }

    channel
        .queue_declare(&config.failed_queue_name, durable_queue(), FieldTable::default())
        .await
        .map_err(|e| anyhow!("Failed to declare failed queue: {}", e))?;

    for exchange in [&config.dlx_name, &config.exchange_name] {
        channel
            .queue_bind(
                &config.failed_queue_name,
                exchange,
                &config.failed_routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to bind failed queue to '{}': {}", exchange, e))?;
    }

    let mut push_args = FieldTable::default();
    push_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(config.dlx_name.clone().into()),
    );
    push_args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(config.failed_routing_key.clone().into()),
    );

    channel
        .queue_declare(&config.push_queue_name, durable_queue(), push_args)
        .await
        .map_err(|e| anyhow!("Failed to declare push queue: {}", e))?;

    channel
        .queue_bind(
            &config.push_queue_name,
            &config.exchange_name,
            &config.push_routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| anyhow!("Failed to bind push queue: {}", e))?;

    info!(
        exchange = %config.exchange_name,
        dlx = %config.dlx_name,
        push_queue = %config.push_queue_name,
        failed_queue = %config.failed_queue_name,
        "RabbitMQ topology declared"
    );

    Ok(())
}

#[async_trait]
impl JobPublisher for RabbitMqClient {
    async fn publish_job(&self, body: &[u8]) -> Result<(), BrokerError> {
        let routing_key = self.push_routing_key.clone();
        self.publish(&routing_key, body).await
    }
}

#[async_trait]
impl StatusPublisher for RabbitMqClient {
    async fn publish_status(&self, event: &StatusEvent) -> Result<(), BrokerError> {
        let payload = serde_json::to_vec(event)?;
        let routing_key = self.status_routing_key.clone();
        self.publish(&routing_key, &payload).await
    }
}
