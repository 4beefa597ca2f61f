//! Seams between the job processor and the systems it talks to.
//!
//! Production wires in the Redis, HTTP, FCM and RabbitMQ clients; tests wire
//! in in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::{BrokerError, DeliveryError, FetchError, StoreError},
    models::{
        notification::PushNotification, status::StatusEvent, template::NotificationTemplate,
        user::DirectoryLookup,
    },
};

/// Outcome of an atomic set-if-absent on the idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This caller created the record and owns the job.
    Claimed,
    /// A record already existed: the job completed (or is being processed) elsewhere.
    AlreadyPresent,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Check-and-claim in one step. Only the first caller for a fresh key sees `Claimed`.
    async fn claim(&self, request_id: &str, ttl: Duration) -> Result<Claim, StoreError>;

    /// Upsert the record and refresh its TTL.
    async fn mark_processed(&self, request_id: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn remove(&self, request_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn fetch_user(&self, user_id: &str) -> Result<DirectoryLookup, FetchError>;
}

#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch_template(&self, template_id: &str) -> Result<NotificationTemplate, FetchError>;
}

#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send(&self, notification: &PushNotification) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publish a serialized job back onto the ingress queue.
    async fn publish_job(&self, body: &[u8]) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish_status(&self, event: &StatusEvent) -> Result<(), BrokerError>;
}
