use std::{future::Future, time::Duration};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{debug, info};

use crate::{
    config::Config,
    error::StoreError,
    models::retry::RetryConfig,
    traits::{Claim, IdempotencyStore},
    utils::retry_with_backoff,
};

const KEY_PREFIX: &str = "push:processed:";

pub fn idempotency_key(request_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, request_id)
}

/// Idempotency records in Redis: `push:processed:<request_id>` -> RFC 3339 timestamp.
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    connection: MultiplexedConnection,
    retry_config: RetryConfig,
    call_timeout: Duration,
}

impl RedisIdempotencyStore {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self::new(
            connection,
            config.retry_config(),
            config.request_timeout(),
        ))
    }

    pub fn new(
        connection: MultiplexedConnection,
        retry_config: RetryConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            retry_config,
            call_timeout,
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        bounded(self.call_timeout, async move { conn.ping::<String>().await })
            .await
            .map(|_| ())
    }
}

async fn bounded<T, F>(call_timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(call_timeout, call).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout),
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn claim(&self, request_id: &str, ttl: Duration) -> Result<Claim, StoreError> {
        let key = idempotency_key(request_id);
        let mut conn = self.connection.clone();

        let reply: Option<String> = bounded(self.call_timeout, async {
            redis::cmd("SET")
                .arg(&key)
                .arg(now_rfc3339())
                .arg("NX")
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async(&mut conn)
                .await
        })
        .await?;

        let claim = match reply {
            Some(_) => Claim::Claimed,
            None => Claim::AlreadyPresent,
        };
        debug!(key = %key, claim = ?claim, "Idempotency claim attempted");

        Ok(claim)
    }

    async fn mark_processed(&self, request_id: &str, ttl: Duration) -> Result<(), StoreError> {
        let key = idempotency_key(request_id);
        let ttl_seconds = ttl.as_secs().max(1);
        let call_timeout = self.call_timeout;

        retry_with_backoff(&self.retry_config, "mark_processed", || {
            let key = key.clone();
            let mut conn = self.connection.clone();

            bounded(call_timeout, async move {
                conn.set_ex::<_, _, ()>(&key, now_rfc3339(), ttl_seconds)
                    .await
            })
        })
        .await
    }

    async fn remove(&self, request_id: &str) -> Result<(), StoreError> {
        let key = idempotency_key(request_id);
        let mut conn = self.connection.clone();

        bounded(self.call_timeout, async move { conn.del::<_, ()>(&key).await }).await
    }
}
