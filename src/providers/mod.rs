/*!
 * Provider implementations for the translation services.
 *
 * This module contains client implementations for the two provider families:
 * - Google: bulk machine translation, one text block per request
 * - Gemini: generative text API used for batch translation and summaries
 */

use async_trait::async_trait;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;

/// Bulk translation provider
///
/// Translates a block of text in one request with automatic source language
/// detection. Implementations must honor the cancellation token and resolve
/// to `ProviderError::Aborted` once it fires.
#[async_trait]
pub trait BulkProvider: Send + Sync + Debug {
    /// Translate `text` into `target_language`
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;
}

/// Sampling settings sent with every generative request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Top-k sampling cutoff
    pub top_k: u32,
    /// Output token limit
    pub max_output_tokens: u32,
    /// Optional thinking budget for models that support it
    pub thinking_budget: Option<i32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 50,
            max_output_tokens: 8192,
            thinking_budget: None,
        }
    }
}

/// One generative request
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Prompt text
    pub prompt: String,
    /// API key to authenticate with
    pub api_key: String,
    /// Sampling settings
    pub settings: GenerationSettings,
}

/// Result of a generative request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResponse {
    /// Concatenated candidate text
    pub text: String,
    /// Total token count reported by the provider, when present
    pub total_tokens: Option<u64>,
    /// Finish reason of the first candidate, e.g. `STOP` or `MAX_TOKENS`
    pub finish_reason: Option<String>,
}

impl GenerationResponse {
    /// Whether the provider cut the output at its token limit
    pub fn hit_token_limit(&self) -> bool {
        self.finish_reason.as_deref() == Some("MAX_TOKENS")
    }
}

/// Generative text provider
#[async_trait]
pub trait GenerativeProvider: Send + Sync + Debug {
    /// Issue a request and wait for the full response
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, ProviderError>;

    /// Issue a streaming request and collect the events until the stream closes
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, ProviderError>;
}

/// Map a non-success HTTP status and body to a provider error
pub(crate) fn error_for_status(status: u16, body: &str) -> ProviderError {
    let snippet: String = body.chars().take(500).collect();
    match status {
        401 | 403 => ProviderError::AuthenticationError(snippet),
        400 if body.contains("API_KEY_INVALID") || body.contains("API key not valid") => {
            ProviderError::AuthenticationError(snippet)
        }
        429 => ProviderError::RateLimitExceeded(snippet),
        _ => ProviderError::ApiError {
            status_code: status,
            message: snippet,
        },
    }
}

/// Map a reqwest transport error
pub(crate) fn transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

pub mod gemini;
pub mod google;
