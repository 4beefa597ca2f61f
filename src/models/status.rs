use std::fmt::{Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Delivered,
    Failed,
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            NotificationStatus::Delivered => write!(f, "delivered"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal outcome of a notification, published for the gateway's status tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub notification_id: String,
    pub status: NotificationStatus,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub service: String,
}

impl StatusEvent {
    pub fn delivered(notification_id: &str) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            status: NotificationStatus::Delivered,
            timestamp: Utc::now(),
            error: None,
            service: "push".to_string(),
        }
    }

    pub fn failed(notification_id: &str, error: String) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            status: NotificationStatus::Failed,
            timestamp: Utc::now(),
            error: Some(error),
            service: "push".to_string(),
        }
    }
}
