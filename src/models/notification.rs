use crate::models::{job::PushJob, template::NotificationTemplate, template::RenderedTemplate};

/// A fully rendered notification addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub device_token: String,
    pub title: String,
    pub body: String,
    pub link_url: String,
    pub image: Option<String>,
    pub correlation_id: String,
}

impl PushNotification {
    pub fn new(
        job: &PushJob,
        device_token: &str,
        template: &NotificationTemplate,
        rendered: RenderedTemplate,
    ) -> Self {
        Self {
            device_token: device_token.to_string(),
            title: rendered.title,
            body: rendered.body,
            link_url: template.link_url.clone(),
            image: template.image.clone().filter(|image| !image.is_empty()),
            correlation_id: job.correlation_id.clone(),
        }
    }
}
