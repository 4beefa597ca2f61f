use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::JobDecodeError;

/// A queued "send a push notification" request.
///
/// `request_id` is the idempotency key and never changes across
/// resubmissions. `retry_count` travels inside the message body, so the next
/// consumer (possibly another process) sees how many transient failures the
/// job has already been through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushJob {
    pub request_id: String,
    pub user_id: String,
    pub template_id: String,

    #[serde(default)]
    pub variables: HashMap<String, String>,

    #[serde(default)]
    pub correlation_id: String,

    #[serde(default)]
    pub retry_count: u32,
}

impl PushJob {
    pub fn decode(payload: &[u8]) -> Result<Self, JobDecodeError> {
        let job = serde_json::from_slice::<Self>(payload)?;

        if job.request_id.trim().is_empty() {
            return Err(JobDecodeError::MissingField("request_id"));
        }
        if job.user_id.trim().is_empty() {
            return Err(JobDecodeError::MissingField("user_id"));
        }
        if job.template_id.trim().is_empty() {
            return Err(JobDecodeError::MissingField("template_id"));
        }

        Ok(job)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Copy of this job carrying the next retry count.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self.clone()
        }
    }
}
