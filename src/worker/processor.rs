use std::{future::Future, sync::Arc, time::Duration};

use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    clients::circuit_breaker::CircuitBreaker,
    error::{DeliveryError, FetchError},
    models::{
        job::PushJob,
        notification::PushNotification,
        status::StatusEvent,
        user::DirectoryLookup,
    },
    renderer::render_template,
    traits::{
        Claim, DeliverySink, IdempotencyStore, JobPublisher, StatusPublisher, TemplateSource,
        UserDirectory,
    },
    worker::{
        disposition::{AckReason, Disposition, RejectReason},
        failure::{Failure, PermanentFailure, TransientFailure},
        router::RetryRouter,
    },
};

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub max_retries: u32,
    pub idempotency_ttl: Duration,
    /// Upper bound on every external call made while processing a job.
    pub call_timeout: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            idempotency_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared clients, built once at startup and handed to the processor.
pub struct Collaborators {
    pub store: Arc<dyn IdempotencyStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub templates: Arc<dyn TemplateSource>,
    pub sink: Arc<dyn DeliverySink>,
    pub publisher: Arc<dyn JobPublisher>,
    pub status: Option<Arc<dyn StatusPublisher>>,
    pub breaker: Arc<CircuitBreaker>,
}

enum Completion {
    Delivered,
    NoDeliverableEndpoint,
}

/// Turns one dequeued message into exactly one [`Disposition`].
pub struct JobProcessor {
    store: Arc<dyn IdempotencyStore>,
    directory: Arc<dyn UserDirectory>,
    templates: Arc<dyn TemplateSource>,
    sink: Arc<dyn DeliverySink>,
    status: Option<Arc<dyn StatusPublisher>>,
    breaker: Arc<CircuitBreaker>,
    router: RetryRouter,
    settings: ProcessorSettings,
}

impl JobProcessor {
    pub fn new(collaborators: Collaborators, settings: ProcessorSettings) -> Self {
        let router = RetryRouter::new(
            collaborators.publisher,
            Arc::clone(&collaborators.store),
            settings.max_retries,
        );

        Self {
            store: collaborators.store,
            directory: collaborators.directory,
            templates: collaborators.templates,
            sink: collaborators.sink,
            status: collaborators.status,
            breaker: collaborators.breaker,
            router,
            settings,
        }
    }

    pub async fn process(&self, payload: &[u8]) -> Disposition {
        let job = match PushJob::decode(payload) {
            Ok(job) => job,
            Err(e) => {
                let failure = PermanentFailure::from(e);
                error!(error = %failure, "Permanent failure, rejecting message");
                return Disposition::Reject(failure.reject_reason());
            }
        };

        let span = info_span!(
            "job",
            request_id = %job.request_id,
            correlation_id = %job.correlation_id,
            retry_count = job.retry_count,
        );

        self.process_job(job).instrument(span).await
    }

    async fn process_job(&self, job: PushJob) -> Disposition {
        info!(user_id = %job.user_id, template_id = %job.template_id, "Consuming job");

        match self.claim(&job).await {
            Claim::AlreadyPresent => {
                info!("Job already processed, acknowledging duplicate");
                return Disposition::Ack(AckReason::Duplicate);
            }
            Claim::Claimed => {}
        }

        if job.retry_count >= self.settings.max_retries {
            let failure = PermanentFailure::RetryBudgetExhausted {
                retry_count: job.retry_count,
                max_retries: self.settings.max_retries,
            };
            return self.reject(&job, failure).await;
        }

        match self.run(&job).await {
            Ok(Completion::Delivered) => self.commit(&job).await,
            Ok(Completion::NoDeliverableEndpoint) => {
                info!(user_id = %job.user_id, "User has no push token, skipping delivery");
                Disposition::Ack(AckReason::NoDeliverableEndpoint)
            }
            Err(Failure::Permanent(failure)) => self.reject(&job, failure).await,
            Err(Failure::Transient(failure)) => match self.router.resubmit(&job, &failure).await {
                Ok(retry_count) => Disposition::Ack(AckReason::Resubmitted { retry_count }),
                Err(e) => {
                    error!(error = %e, "Resubmission failed, rejecting original delivery");
                    self.publish_status(StatusEvent::failed(&job.request_id, e.to_string()))
                        .await;
                    Disposition::Reject(RejectReason::ResubmitFailed)
                }
            },
        }
    }

    /// Store errors fail open: losing strict idempotency beats stalling the queue.
    async fn claim(&self, job: &PushJob) -> Claim {
        let result = bounded(
            self.settings.call_timeout,
            self.store.claim(&job.request_id, self.settings.idempotency_ttl),
        )
        .await;

        match result {
            Some(Ok(claim)) => claim,
            Some(Err(e)) => {
                warn!(error = %e, "Idempotency check failed, cannot guarantee idempotency");
                Claim::Claimed
            }
            None => {
                warn!("Idempotency check timed out, cannot guarantee idempotency");
                Claim::Claimed
            }
        }
    }

    async fn run(&self, job: &PushJob) -> Result<Completion, Failure> {
        let lookup = bounded(self.settings.call_timeout, self.directory.fetch_user(&job.user_id))
            .await
            .unwrap_or_else(|| Err(FetchError::Unreachable("user lookup timed out".to_string())))
            .map_err(TransientFailure::UserLookup)?;

        let profile = match lookup {
            DirectoryLookup::Deliverable(profile) => profile,
            DirectoryLookup::NoDeliverableEndpoint => return Ok(Completion::NoDeliverableEndpoint),
        };

        let template = bounded(
            self.settings.call_timeout,
            self.templates.fetch_template(&job.template_id),
        )
        .await
        .unwrap_or_else(|| Err(FetchError::Unreachable("template lookup timed out".to_string())))
        .map_err(TransientFailure::TemplateLookup)?;

        let rendered = render_template(&template, &job.variables).map_err(PermanentFailure::from)?;

        let notification = PushNotification::new(job, &profile.push_token, &template, rendered);
        self.deliver(&notification).await?;

        Ok(Completion::Delivered)
    }

    async fn deliver(&self, notification: &PushNotification) -> Result<(), TransientFailure> {
        let call_timeout = self.settings.call_timeout;
        let send = async {
            bounded(call_timeout, self.sink.send(notification))
                .await
                .unwrap_or(Err(DeliveryError::Timeout))
        };

        self.breaker
            .execute(send)
            .await
            .map_err(|source| TransientFailure::Delivery {
                state: self.breaker.state(),
                source,
            })
    }

    async fn commit(&self, job: &PushJob) -> Disposition {
        if let Err(e) = self
            .store
            .mark_processed(&job.request_id, self.settings.idempotency_ttl)
            .await
        {
            warn!(error = %e, "Failed to mark job as processed");
        }

        self.publish_status(StatusEvent::delivered(&job.request_id))
            .await;

        info!(user_id = %job.user_id, "Successfully processed notification");
        Disposition::Ack(AckReason::Delivered)
    }

    async fn reject(&self, job: &PushJob, failure: PermanentFailure) -> Disposition {
        error!(error = %failure, "Permanent failure, rejecting job");

        self.publish_status(StatusEvent::failed(&job.request_id, failure.to_string()))
            .await;

        Disposition::Reject(failure.reject_reason())
    }

    async fn publish_status(&self, event: StatusEvent) {
        let Some(status) = &self.status else {
            return;
        };

        if let Err(e) = status.publish_status(&event).await {
            warn!(error = %e, status = %event.status, "Failed to publish status event");
        }
    }
}

async fn bounded<F: Future>(call_timeout: Duration, call: F) -> Option<F::Output> {
    tokio::time::timeout(call_timeout, call).await.ok()
}
