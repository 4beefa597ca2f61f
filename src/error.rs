use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobDecodeError {
    #[error("Invalid job JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Job is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Failure of a user or template service lookup. Every variant is retryable.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Service unreachable: {0}")]
    Unreachable(String),

    #[error("Service returned status {0}")]
    NonSuccessStatus(u16),

    #[error("Invalid response envelope: {0}")]
    EnvelopeError(String),

    #[error("Response payload does not match expected schema: {0}")]
    PayloadMismatch(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Failed to parse {field} template: {reason}")]
    Parse { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Push transport error: {0}")]
    Transport(String),

    #[error("Push gateway rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Push gateway authentication failed: {0}")]
    Auth(String),

    #[error("Push delivery timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("Circuit breaker is open")]
    Open,

    #[error("Circuit breaker is half-open and a trial call is already in flight")]
    TooManyRequests,

    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// True when the breaker refused the call without running it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::Open | BreakerError::TooManyRequests)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis call timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("RabbitMQ error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Broker negatively acknowledged the publish")]
    Nacked,

    #[error("Broker call timed out")]
    Timeout,

    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ResubmitError {
    #[error("Failed to serialize job for resubmission: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to publish job for resubmission: {0}")]
    Publish(#[from] BrokerError),
}
