use std::{collections::BTreeMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{circuit_breaker::CircuitBreaker, rbmq::RabbitMqClient, redis::RedisIdempotencyStore},
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

const CRITICAL_CHECKS: [&str; 2] = ["cache_service", "message_broker"];

pub struct HealthChecker {
    store: RedisIdempotencyStore,
    broker: Arc<RabbitMqClient>,
    breaker: Arc<CircuitBreaker>,
}

impl HealthChecker {
    pub fn new(
        store: RedisIdempotencyStore,
        broker: Arc<RabbitMqClient>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            store,
            broker,
            breaker,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = BTreeMap::new();

        checks.insert("cache_service".to_string(), self.check_redis().await);
        checks.insert("message_broker".to_string(), self.check_rabbitmq());
        checks.insert("delivery".to_string(), self.check_circuit_breaker());

        HealthCheckResponse {
            status: overall_status(&checks),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.store.ping().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Redis health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                ServiceHealth::unhealthy(format!("Ping failed: {}", e))
            }
        }
    }

    fn check_rabbitmq(&self) -> ServiceHealth {
        if self.broker.is_connected() {
            ServiceHealth::healthy(0)
        } else {
            warn!("RabbitMQ channel is not connected");
            ServiceHealth::unhealthy("Channel not connected".to_string())
        }
    }

    fn check_circuit_breaker(&self) -> ServiceHealth {
        let state = self.breaker.state();
        debug!(breaker = %self.breaker.name(), circuit_state = %state, "Circuit breaker state checked");
        ServiceHealth::from_circuit(state, self.breaker.counts())
    }
}

/// Unhealthy if any critical dependency is down, degraded if anything else is not healthy.
pub fn overall_status(checks: &BTreeMap<String, ServiceHealth>) -> HealthStatus {
    let critical_unhealthy = checks
        .iter()
        .filter(|(name, _)| CRITICAL_CHECKS.contains(&name.as_str()))
        .any(|(_, health)| health.status == HealthStatus::Unhealthy);

    if critical_unhealthy {
        return HealthStatus::Unhealthy;
    }

    if checks
        .values()
        .any(|health| health.status != HealthStatus::Healthy)
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
