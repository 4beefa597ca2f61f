use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use reqwest::{Client, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::debug;

use crate::{error::FetchError, models::response::ApiResponse};

/// `GET <base_url>/<id>` against a service that answers with the standard envelope.
#[derive(Clone)]
pub struct LookupClient {
    service: &'static str,
    http_client: Client,
    base_url: Url,
}

impl LookupClient {
    pub fn new(service: &'static str, base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client for {}: {}", service, e))?;

        Self::with_client(service, base_url, http_client)
    }

    pub fn with_client(
        service: &'static str,
        base_url: &str,
        http_client: Client,
    ) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow!("Invalid {} base URL '{}': {}", service, base_url, e))?;

        if base_url.cannot_be_a_base() {
            return Err(anyhow!("{} base URL '{}' cannot be a base", service, base_url));
        }

        Ok(Self {
            service,
            http_client,
            base_url,
        })
    }

    pub fn url_for(&self, id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(id);
        }
        url
    }

    pub async fn fetch<T: DeserializeOwned>(&self, id: &str) -> Result<T, FetchError> {
        let url = self.url_for(id);
        debug!(service = self.service, url = %url, "Fetching from service");

        let response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Unreachable(format!("{} request timed out", self.service))
            } else {
                FetchError::Unreachable(format!("{}: {}", self.service, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::NonSuccessStatus(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Unreachable(format!("{}: {}", self.service, e)))?;

        decode_envelope(&bytes)
    }
}

/// Decodes `bytes` as an envelope and returns its typed `data`.
///
/// The envelope is read once with an opaque payload to check `success`, then
/// the same bytes are decoded with the concrete payload type.
pub fn decode_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FetchError> {
    let envelope = serde_json::from_slice::<ApiResponse<IgnoredAny>>(bytes)
        .map_err(|e| FetchError::EnvelopeError(e.to_string()))?;

    if !envelope.success {
        return Err(FetchError::EnvelopeError(format!(
            "service reported failure: {}",
            envelope.failure_reason()
        )));
    }

    if envelope.data.is_none() {
        return Err(FetchError::EnvelopeError(
            "successful response without data".to_string(),
        ));
    }

    serde_json::from_slice::<ApiResponse<T>>(bytes)
        .map_err(|e| FetchError::PayloadMismatch(e.to_string()))?
        .data
        .ok_or_else(|| FetchError::EnvelopeError("successful response without data".to_string()))
}
