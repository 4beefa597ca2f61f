use async_trait::async_trait;
use tracing::info;

use crate::{error::DeliveryError, models::notification::PushNotification, traits::DeliverySink};

/// Logs notifications instead of pushing them. Used for local development.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    async fn send(&self, notification: &PushNotification) -> Result<(), DeliveryError> {
        info!(
            correlation_id = %notification.correlation_id,
            title = %notification.title,
            body = %notification.body,
            link_url = %notification.link_url,
            "Push notification (log sink)"
        );
        Ok(())
    }
}
