use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;
use super::{
    GenerationRequest, GenerationResponse, GenerationSettings, GenerativeProvider,
    error_for_status, transport_error,
};

/// Default base URL of the generative language API
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini client for the generateContent family of endpoints
#[derive(Debug, Clone)]
pub struct Gemini {
    /// Base URL of the API
    endpoint: String,
    /// Model name, e.g. `gemini-2.5-flash`
    model: String,
    /// HTTP client for making requests
    client: Client,
}

/// Request body for generateContent
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiRequest {
    /// Conversation contents; a single user turn here
    contents: Vec<Content>,
    /// Sampling configuration
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

/// One content turn
#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    /// Role of the turn
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    /// Text parts
    #[serde(default)]
    parts: Vec<Part>,
}

/// A text part
#[derive(Debug, Serialize, Deserialize)]
pub struct Part {
    /// Part text
    #[serde(default)]
    text: Option<String>,
    /// Set on parts that carry model reasoning rather than output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

/// Sampling configuration
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

/// Thinking budget configuration
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    thinking_budget: i32,
}

/// Response body (full or one streamed event)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

/// A response candidate
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Token accounting
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    total_token_count: Option<u64>,
}

impl GeminiRequest {
    /// Build a request body from a prompt and settings
    pub fn new(prompt: &str, settings: &GenerationSettings) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: Some(prompt.to_string()), thought: None }],
            }],
            generation_config: GenerationConfig {
                temperature: settings.temperature,
                top_p: settings.top_p,
                top_k: settings.top_k,
                max_output_tokens: settings.max_output_tokens,
                thinking_config: settings.thinking_budget.map(|thinking_budget| ThinkingConfig { thinking_budget }),
            },
        }
    }
}

impl GeminiResponse {
    /// Fold this response (or streamed event) into an accumulated result
    pub fn absorb_into(self, acc: &mut GenerationResponse) {
        if let Some(tokens) = self.usage_metadata.and_then(|u| u.total_token_count) {
            acc.total_tokens = Some(tokens);
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return;
        };
        if let Some(content) = candidate.content {
            for part in content.parts {
                if part.thought == Some(true) {
                    continue;
                }
                if let Some(text) = part.text {
                    acc.text.push_str(&text);
                }
            }
        }
        if candidate.finish_reason.is_some() {
            acc.finish_reason = candidate.finish_reason;
        }
    }
}

/// Incremental parser for `data: {...}` server-sent events
#[derive(Debug, Default)]
pub struct SseAccumulator {
    pending: Vec<u8>,
    response: GenerationResponse,
}

impl SseAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; complete lines are parsed immediately
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), ProviderError> {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.parse_line(&line)?;
        }
        Ok(())
    }

    /// Parse any trailing partial line and return the collected response
    pub fn finish(mut self) -> Result<GenerationResponse, ProviderError> {
        let rest = std::mem::take(&mut self.pending);
        self.parse_line(&rest)?;
        Ok(self.response)
    }

    fn parse_line(&mut self, line: &[u8]) -> Result<(), ProviderError> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Ok(());
        }

        let event: GeminiResponse = serde_json::from_str(data)
            .map_err(|e| ProviderError::ParseError(format!("Invalid stream event: {}", e)))?;
        event.absorb_into(&mut self.response);
        Ok(())
    }
}

impl Gemini {
    /// Create a new Gemini client
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: if endpoint.is_empty() {
                DEFAULT_GEMINI_ENDPOINT.to_string()
            } else {
                endpoint.trim_end_matches('/').to_string()
            },
            model: model.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    /// URL of a model method, e.g. `generateContent`
    fn method_url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.endpoint, self.model, method)
    }

    async fn post(&self, url: &str, request: &GenerationRequest) -> Result<reqwest::Response, ProviderError> {
        let body = GeminiRequest::new(&request.prompt, &request.settings);
        let response = self.client.post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Gemini API error ({}): {}", status, error_text.chars().take(300).collect::<String>());
            return Err(error_for_status(status.as_u16(), &error_text));
        }
        Ok(response)
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let response = self.post(&self.method_url("generateContent"), request).await?;
        let text = response.text().await.map_err(transport_error)?;
        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::ParseError(format!("Invalid Gemini response: {}", e)))?;

        let mut acc = GenerationResponse::default();
        parsed.absorb_into(&mut acc);
        Ok(acc)
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}?alt=sse", self.method_url("streamGenerateContent"));
        let response = self.post(&url, request).await?;

        let mut accumulator = SseAccumulator::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(transport_error)?;
            accumulator.push(&bytes)?;
        }
        accumulator.finish()
    }
}

#[async_trait]
impl GenerativeProvider for Gemini {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, ProviderError> {
        debug!("Gemini generate: {} prompt chars", request.prompt.chars().count());
        tokio::select! {
            _ = cancel.cancelled() => Err(ProviderError::Aborted),
            result = self.complete(request) => result,
        }
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, ProviderError> {
        debug!("Gemini stream: {} prompt chars", request.prompt.chars().count());
        tokio::select! {
            _ = cancel.cancelled() => Err(ProviderError::Aborted),
            result = self.stream(request) => result,
        }
    }
}
