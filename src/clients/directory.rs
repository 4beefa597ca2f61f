use anyhow::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    clients::lookup::LookupClient,
    config::Config,
    error::FetchError,
    models::user::{DirectoryLookup, UserProfile},
    traits::UserDirectory,
};

pub struct UserServiceClient {
    lookup: LookupClient,
}

impl UserServiceClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let lookup = LookupClient::new(
            "user_service",
            &config.user_service_url,
            config.request_timeout(),
        )?;

        info!(base_url = %config.user_service_url, "User service client initialized");

        Ok(Self { lookup })
    }

    pub fn from_lookup(lookup: LookupClient) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl UserDirectory for UserServiceClient {
    async fn fetch_user(&self, user_id: &str) -> Result<DirectoryLookup, FetchError> {
        let profile = self.lookup.fetch::<UserProfile>(user_id).await?;

        debug!(
            user_id,
            language = %profile.language,
            is_active = profile.is_active,
            has_endpoint = profile.has_endpoint(),
            "User profile fetched"
        );

        Ok(DirectoryLookup::from(profile))
    }
}
