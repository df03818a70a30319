/*!
 * Mock provider implementations for testing
 *
 * Both mocks delegate to a closure that sees the call number and the
 * request, so each test scripts exactly the misbehavior it needs. Every
 * call is recorded for later assertions; no network access happens.
 */

use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use sublingo::errors::ProviderError;
use sublingo::providers::{BulkProvider, GenerationRequest, GenerationResponse, GenerativeProvider};
use sublingo::translation::BatchItem;
use sublingo::translation::chunking::PRIMARY_SEPARATOR;

type BulkBehavior = dyn Fn(usize, &str) -> Result<String, ProviderError> + Send + Sync;
type GenerativeBehavior = dyn Fn(usize, &GenerationRequest) -> Result<GenerationResponse, ProviderError> + Send + Sync;

/// Type of error to simulate
#[derive(Debug, Clone, Copy)]
pub enum MockErrorType {
    /// Authentication error (invalid API key)
    Auth,
    /// Connection error
    Connection,
    /// Rate limit error
    RateLimit,
    /// API error
    Api,
}

impl MockErrorType {
    /// Provider error of this type
    pub fn error(self) -> ProviderError {
        match self {
            MockErrorType::Auth => ProviderError::AuthenticationError("Invalid API key".into()),
            MockErrorType::Connection => ProviderError::ConnectionError("Connection failed".into()),
            MockErrorType::RateLimit => ProviderError::RateLimitExceeded("Rate limit exceeded".into()),
            MockErrorType::Api => ProviderError::ApiError {
                status_code: 500,
                message: "Internal error".into(),
            },
        }
    }
}

/// Mock bulk provider
pub struct MockBulkProvider {
    behavior: Box<BulkBehavior>,
    calls: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl Debug for MockBulkProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBulkProvider").field("calls", &self.call_count()).finish()
    }
}

impl MockBulkProvider {
    /// Provider driven by a closure of (call number, text)
    pub fn new<F>(behavior: F) -> Self
    where
        F: Fn(usize, &str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            behavior: Box::new(behavior),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns every text unchanged
    pub fn identity() -> Self {
        Self::new(|_, text| Ok(text.to_string()))
    }

    /// Upper-cases every text, which passes the unchanged-text check
    pub fn uppercase() -> Self {
        Self::new(|_, text| Ok(text.to_uppercase()))
    }

    /// Drops the primary separator from every response
    pub fn separator_dropping() -> Self {
        Self::new(|_, text| Ok(text.replace(PRIMARY_SEPARATOR.bare, " ").to_uppercase()))
    }

    /// Fails every call
    pub fn failing(error_type: MockErrorType) -> Self {
        Self::new(move |_, _| Err(error_type.error()))
    }

    /// Number of calls made
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts received, in call order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BulkProvider for MockBulkProvider {
    async fn translate(&self, text: &str, _target_language: &str, cancel: &CancellationToken) -> Result<String, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Aborted);
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(text.to_string());
        (self.behavior)(call, text)
    }
}

/// Mock generative provider
pub struct MockGenerativeProvider {
    behavior: Box<GenerativeBehavior>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl Debug for MockGenerativeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockGenerativeProvider").field("calls", &self.call_count()).finish()
    }
}

impl MockGenerativeProvider {
    /// Provider driven by a closure of (call number, request)
    pub fn new<F>(behavior: F) -> Self
    where
        F: Fn(usize, &GenerationRequest) -> Result<GenerationResponse, ProviderError> + Send + Sync + 'static,
    {
        Self {
            behavior: Box::new(behavior),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every batch correctly with `[tr] ` prefixed texts
    pub fn translating() -> Self {
        Self::new(|_, request| Ok(text_response(&batch_answer(&batch_items(&request.prompt), |t| format!("[tr] {}", t)))))
    }

    /// Answers with fixed texts, one per call; the last one repeats
    pub fn scripted(responses: Vec<GenerationResponse>) -> Self {
        Self::new(move |call, _| {
            let index = call.min(responses.len().saturating_sub(1));
            responses
                .get(index)
                .cloned()
                .ok_or_else(|| ProviderError::ApiError { status_code: 500, message: "no response scripted".into() })
        })
    }

    /// Number of calls made
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in call order
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn respond(&self, request: &GenerationRequest, cancel: &CancellationToken) -> Result<GenerationResponse, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Aborted);
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        (self.behavior)(call, request)
    }
}

#[async_trait]
impl GenerativeProvider for MockGenerativeProvider {
    async fn generate(&self, request: &GenerationRequest, cancel: &CancellationToken) -> Result<GenerationResponse, ProviderError> {
        self.respond(request, cancel).await
    }

    async fn generate_stream(&self, request: &GenerationRequest, cancel: &CancellationToken) -> Result<GenerationResponse, ProviderError> {
        self.respond(request, cancel).await
    }
}

/// Response with the given text and a normal finish
pub fn text_response(text: &str) -> GenerationResponse {
    GenerationResponse {
        text: text.to_string(),
        total_tokens: Some(42),
        finish_reason: Some("STOP".to_string()),
    }
}

/// Response cut off by the output token limit
pub fn truncated_response(text: &str) -> GenerationResponse {
    GenerationResponse {
        text: text.to_string(),
        total_tokens: Some(8192),
        finish_reason: Some("MAX_TOKENS".to_string()),
    }
}

/// Items embedded in a batch prompt
pub fn batch_items(prompt: &str) -> Vec<BatchItem> {
    let Some(start) = prompt.find("## Items\n") else {
        return Vec::new();
    };
    let body = &prompt[start + "## Items\n".len()..];
    let body = match body.find("\n\nIMPORTANT") {
        Some(end) => &body[..end],
        None => body,
    };
    serde_json::from_str(body.trim()).unwrap_or_default()
}

/// Whether a batch prompt carries the strict JSON-only directive
pub fn is_strict(prompt: &str) -> bool {
    prompt.contains("Output JSON only")
}

/// JSON answer for `items` with each text mapped through `f`
pub fn batch_answer<F: Fn(&str) -> String>(items: &[BatchItem], f: F) -> String {
    let answer: Vec<BatchItem> = items
        .iter()
        .map(|item| BatchItem { id: item.id, text: f(&item.text) })
        .collect();
    serde_json::to_string(&answer).unwrap()
}
