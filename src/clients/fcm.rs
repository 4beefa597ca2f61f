use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::Client;
use tracing::{debug, info};

use crate::{
    config::Config,
    error::DeliveryError,
    models::{
        fcm::{FcmMessage, FcmNotification, FcmRequest, FcmResponse},
        notification::PushNotification,
    },
    traits::DeliverySink,
};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

/// Firebase Cloud Messaging HTTP v1 delivery.
pub struct FcmClient {
    http_client: Client,
    endpoint: String,
    token_provider: Arc<dyn TokenProvider>,
}

impl FcmClient {
    pub async fn new(config: &Config) -> Result<Self, Error> {
        let project_id = config
            .fcm_project_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("FCM_PROJECT_ID is not set"))?;

        let token_provider = gcp_auth::provider()
            .await
            .map_err(|e| anyhow!("Failed to initialise Google credentials: {}", e))?;

        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| anyhow!("Failed to create FCM HTTP client: {}", e))?;

        info!(project_id, "FCM client initialized");

        Ok(Self {
            http_client,
            endpoint: format!(
                "https://fcm.googleapis.com/v1/projects/{}/messages:send",
                project_id
            ),
            token_provider,
        })
    }

    fn build_request(notification: &PushNotification) -> FcmRequest {
        let mut data = HashMap::new();
        if !notification.link_url.is_empty() {
            data.insert("link_url".to_string(), notification.link_url.clone());
        }
        if !notification.correlation_id.is_empty() {
            data.insert(
                "correlation_id".to_string(),
                notification.correlation_id.clone(),
            );
        }

        FcmRequest {
            message: FcmMessage {
                token: notification.device_token.clone(),
                notification: FcmNotification {
                    title: notification.title.clone(),
                    body: notification.body.clone(),
                    image: notification.image.clone(),
                },
                data,
            },
        }
    }
}

#[async_trait]
impl DeliverySink for FcmClient {
    async fn send(&self, notification: &PushNotification) -> Result<(), DeliveryError> {
        debug!(
            correlation_id = %notification.correlation_id,
            "Sending FCM push notification"
        );

        let token = self
            .token_provider
            .token(FCM_SCOPES)
            .await
            .map_err(|e| DeliveryError::Auth(e.to_string()))?;

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(token.as_str())
            .json(&Self::build_request(notification))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            match response.json::<FcmResponse>().await {
                Ok(sent) => info!(message_name = %sent.name, "FCM push notification sent"),
                Err(_) => info!("FCM push notification sent"),
            }
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
