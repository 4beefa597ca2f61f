//! In-memory stand-ins for every collaborator the job processor talks to.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use push_worker::{
    clients::circuit_breaker::CircuitBreaker,
    error::{BrokerError, DeliveryError, FetchError, StoreError},
    models::{
        circuit_breaker::CircuitBreakerConfig,
        job::PushJob,
        notification::PushNotification,
        status::StatusEvent,
        template::NotificationTemplate,
        user::{DirectoryLookup, UserProfile},
    },
    traits::{
        Claim, DeliverySink, IdempotencyStore, JobPublisher, StatusPublisher, TemplateSource,
        UserDirectory,
    },
    worker::processor::{Collaborators, JobProcessor, ProcessorSettings},
};
use serde_json::json;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
    pub unavailable: AtomicBool,
    pub removals: AtomicUsize,
}

impl MemoryStore {
    pub fn contains(&self, request_id: &str) -> bool {
        self.records.lock().unwrap().contains_key(request_id)
    }

    pub fn insert(&self, request_id: &str) {
        self.records
            .lock()
            .unwrap()
            .insert(request_id.to_string(), "2026-01-01T00:00:00Z".to_string());
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn claim(&self, request_id: &str, _ttl: Duration) -> Result<Claim, StoreError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        if records.contains_key(request_id) {
            return Ok(Claim::AlreadyPresent);
        }
        records.insert(request_id.to_string(), "claimed".to_string());
        Ok(Claim::Claimed)
    }

    async fn mark_processed(&self, request_id: &str, _ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        self.insert(request_id);
        Ok(())
    }

    async fn remove(&self, request_id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.removals.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().remove(request_id);
        Ok(())
    }
}

fn profile(token: &str) -> UserProfile {
    UserProfile {
        push_token: token.to_string(),
        language: "en".to_string(),
        is_active: true,
    }
}

/// `None` makes every lookup fail as unreachable.
pub struct FakeDirectory {
    profile: Mutex<Option<UserProfile>>,
    pub calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_token(token: &str) -> Self {
        Self {
            profile: Mutex::new(Some(profile(token))),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_token(&self, token: &str) {
        *self.profile.lock().unwrap() = Some(profile(token));
    }

    pub fn set_unreachable(&self) {
        *self.profile.lock().unwrap() = None;
    }
}

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn fetch_user(&self, _user_id: &str) -> Result<DirectoryLookup, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.profile.lock().unwrap().clone() {
            Some(profile) => Ok(DirectoryLookup::from(profile)),
            None => Err(FetchError::Unreachable("user_service: connection refused".to_string())),
        }
    }
}

pub struct FakeTemplates {
    template: Mutex<NotificationTemplate>,
    pub unreachable: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeTemplates {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            template: Mutex::new(NotificationTemplate {
                title: title.to_string(),
                body: body.to_string(),
                link_url: "https://example.com/orders".to_string(),
                image: None,
            }),
            unreachable: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, title: &str, body: &str) {
        let mut template = self.template.lock().unwrap();
        template.title = title.to_string();
        template.body = body.to_string();
    }
}

#[async_trait]
impl TemplateSource for FakeTemplates {
    async fn fetch_template(&self, _template_id: &str) -> Result<NotificationTemplate, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(
                "template_service: connection refused".to_string(),
            ));
        }
        Ok(self.template.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<PushNotification>>,
    pub attempts: AtomicUsize,
    pub failing: AtomicBool,
    pub delay: Mutex<Duration>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<PushNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send(&self, notification: &PushNotification) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected {
                status: 503,
                body: "UNAVAILABLE".to_string(),
            });
        }

        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub jobs: Mutex<Vec<PushJob>>,
    pub statuses: Mutex<Vec<StatusEvent>>,
    pub failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn jobs(&self) -> Vec<PushJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<StatusEvent> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobPublisher for RecordingPublisher {
    async fn publish_job(&self, body: &[u8]) -> Result<(), BrokerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BrokerError::Nacked);
        }
        let job: PushJob = serde_json::from_slice(body)?;
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish_status(&self, event: &StatusEvent) -> Result<(), BrokerError> {
        self.statuses.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub directory: Arc<FakeDirectory>,
    pub templates: Arc<FakeTemplates>,
    pub sink: Arc<RecordingSink>,
    pub publisher: Arc<RecordingPublisher>,
    pub breaker: Arc<CircuitBreaker>,
    pub processor: Arc<JobProcessor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_breaker(CircuitBreakerConfig::default())
    }

    pub fn with_breaker(breaker: CircuitBreakerConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        let directory = Arc::new(FakeDirectory::with_token("tok-1"));
        let templates = Arc::new(FakeTemplates::new("Hi {{.Vars.name}}", "Your order shipped"));
        let sink = Arc::new(RecordingSink::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let breaker = Arc::new(CircuitBreaker::new("push_delivery_test", breaker));

        let processor = Arc::new(JobProcessor::new(
            Collaborators {
                store: store.clone(),
                directory: directory.clone(),
                templates: templates.clone(),
                sink: sink.clone(),
                publisher: publisher.clone(),
                status: Some(publisher.clone() as Arc<dyn StatusPublisher>),
                breaker: breaker.clone(),
            },
            ProcessorSettings {
                max_retries: 5,
                idempotency_ttl: Duration::from_secs(60),
                call_timeout: Duration::from_millis(200),
            },
        ));

        Self {
            store,
            directory,
            templates,
            sink,
            publisher,
            breaker,
            processor,
        }
    }
}

pub fn job_payload(request_id: &str, retry_count: u32) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "request_id": request_id,
        "user_id": "u1",
        "template_id": "order_shipped",
        "variables": { "name": "Ann" },
        "correlation_id": format!("corr-{}", request_id),
        "retry_count": retry_count,
    }))
    .unwrap()
}
