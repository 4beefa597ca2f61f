use anyhow::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    clients::lookup::LookupClient, config::Config, error::FetchError,
    models::template::NotificationTemplate, traits::TemplateSource,
};

pub struct TemplateServiceClient {
    lookup: LookupClient,
}

impl TemplateServiceClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let lookup = LookupClient::new(
            "template_service",
            &config.template_service_url,
            config.request_timeout(),
        )?;

        info!(base_url = %config.template_service_url, "Template service client initialized");

        Ok(Self { lookup })
    }

    pub fn from_lookup(lookup: LookupClient) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl TemplateSource for TemplateServiceClient {
    async fn fetch_template(&self, template_id: &str) -> Result<NotificationTemplate, FetchError> {
        let template = self.lookup.fetch::<NotificationTemplate>(template_id).await?;

        debug!(template_id, "Template fetched");

        Ok(template)
    }
}
