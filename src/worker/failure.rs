use thiserror::Error;

use crate::{
    error::{BreakerError, DeliveryError, FetchError, JobDecodeError, RenderError},
    models::circuit_breaker::CircuitState,
    worker::disposition::RejectReason,
};

/// Why a job failed, and therefore whether retrying can help.
#[derive(Debug, Error)]
pub enum Failure {
    #[error(transparent)]
    Permanent(#[from] PermanentFailure),

    #[error(transparent)]
    Transient(#[from] TransientFailure),
}

/// Retrying cannot fix these; the job is rejected to the dead-letter path.
#[derive(Debug, Error)]
pub enum PermanentFailure {
    #[error("malformed job payload: {0}")]
    Malformed(#[from] JobDecodeError),

    #[error("max retries reached ({retry_count}/{max_retries})")]
    RetryBudgetExhausted { retry_count: u32, max_retries: u32 },

    #[error("failed to render template: {0}")]
    Render(#[from] RenderError),
}

impl PermanentFailure {
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            PermanentFailure::Malformed(_) => RejectReason::Malformed,
            PermanentFailure::RetryBudgetExhausted { .. } => RejectReason::RetryBudgetExhausted,
            PermanentFailure::Render(_) => RejectReason::RenderFailed,
        }
    }
}

/// Believed recoverable; the job is resubmitted with an incremented retry count.
#[derive(Debug, Error)]
pub enum TransientFailure {
    #[error("user lookup failed: {0}")]
    UserLookup(FetchError),

    #[error("template lookup failed: {0}")]
    TemplateLookup(FetchError),

    #[error("push delivery failed (circuit breaker: {state}): {source}")]
    Delivery {
        state: CircuitState,
        source: BreakerError<DeliveryError>,
    },
}
