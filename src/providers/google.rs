use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::errors::ProviderError;
use super::{BulkProvider, error_for_status, transport_error};

/// Default endpoint of the public translate API
pub const DEFAULT_GOOGLE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Google Translate client for bulk text blocks
#[derive(Debug, Clone)]
pub struct GoogleTranslate {
    /// Endpoint URL
    endpoint: String,
    /// HTTP client for making requests
    client: Client,
}

impl GoogleTranslate {
    /// Create a new client
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: if endpoint.is_empty() { DEFAULT_GOOGLE_ENDPOINT.to_string() } else { endpoint },
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Build the request URL for one text block
    pub fn request_url(&self, text: &str, target_language: &str) -> Result<Url, ProviderError> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target_language),
                ("dt", "t"),
                ("q", text),
            ],
        )
        .map_err(|e| ProviderError::RequestFailed(format!("Invalid endpoint {}: {}", self.endpoint, e)))
    }

    /// Concatenate the translated segments of a response.
    ///
    /// The response is a nested array whose first element lists
    /// `[translated, original, ...]` pairs.
    pub fn extract_translation(response: &Value) -> Result<String, ProviderError> {
        let segments = response
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::ParseError("response has no segment list".to_string()))?;

        Ok(segments
            .iter()
            .filter_map(|pair| pair.get(0).and_then(Value::as_str))
            .collect())
    }

    async fn send(&self, text: &str, target_language: &str) -> Result<String, ProviderError> {
        let url = self.request_url(text, target_language)?;
        let response = self.client.get(url).send().await.map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(error_for_status(status.as_u16(), &body));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::ParseError(format!("Invalid translate response: {}", e)))?;
        Self::extract_translation(&value)
    }
}

#[async_trait]
impl BulkProvider for GoogleTranslate {
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        debug!("Google translate request: {} chars -> {}", text.chars().count(), target_language);
        tokio::select! {
            _ = cancel.cancelled() => Err(ProviderError::Aborted),
            result = self.send(text, target_language) => result,
        }
    }
}
