use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    error::ResubmitError,
    models::job::PushJob,
    traits::{IdempotencyStore, JobPublisher},
    worker::failure::TransientFailure,
};

/// Sends transiently failed jobs around for another attempt.
///
/// Retries are explicit republishes of a mutated body rather than broker
/// requeues, so the retry count the next consumer sees is exactly one higher.
pub struct RetryRouter {
    publisher: Arc<dyn JobPublisher>,
    store: Arc<dyn IdempotencyStore>,
    max_retries: u32,
}

impl RetryRouter {
    pub fn new(
        publisher: Arc<dyn JobPublisher>,
        store: Arc<dyn IdempotencyStore>,
        max_retries: u32,
    ) -> Self {
        Self {
            publisher,
            store,
            max_retries,
        }
    }

    /// Publishes `job` with `retry_count + 1` and releases its idempotency claim.
    ///
    /// Returns the retry count carried by the published copy. On error nothing
    /// was published and the original delivery must be rejected.
    pub async fn resubmit(
        &self,
        job: &PushJob,
        failure: &TransientFailure,
    ) -> Result<u32, ResubmitError> {
        warn!(
            retry_count = job.retry_count,
            max_retries = self.max_retries,
            error = %failure,
            "Transient failure, re-queuing job"
        );

        let next = job.next_attempt();
        let body = next.encode()?;

        self.publisher.publish_job(&body).await?;

        // The claim taken at the duplicate check was not a completed delivery.
        if let Err(e) = self.store.remove(&job.request_id).await {
            warn!(error = %e, "Failed to remove idempotency key after resubmission");
        }

        info!(next_retry_count = next.retry_count, "Job resubmitted");

        Ok(next.retry_count)
    }
}
