/*!
 * Error types for the sublingo application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 *
 * The taxonomy maps onto the failure classes the translation ladders react to:
 * - `SubtitleError::Format`: unparseable input document, never retried
 * - transport-class `ProviderError`s: retried with backoff, then escalated
 * - `ProviderError::AuthenticationError`: key rotation (batch) or fatal (bulk)
 * - `ProviderError::ParseError` / `TranslationError::Content`: malformed output
 * - `Aborted` variants: cooperative cancellation, reported distinctly
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The request was cancelled through its cancellation token
    #[error("Request aborted")]
    Aborted,
}

impl ProviderError {
    /// Whether the error is worth another attempt with the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::ConnectionError(_) | Self::RateLimitExceeded(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 408,
            Self::ParseError(_) | Self::AuthenticationError(_) | Self::Aborted => false,
        }
    }

    /// Whether the error was caused by an invalid credential
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationError(_))
    }

    /// Whether the error is the result of cancellation
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// The input could not be read as a subtitle document
    #[error("Invalid subtitle format: {0}")]
    Format(String),

    /// Reading or writing a subtitle file failed
    #[error("Subtitle file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during translation and summarization
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error with subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// The provider answered, but the content could not be used
    #[error("Unusable provider output: {0}")]
    Content(String),

    /// Every fallback for a unit of work failed
    #[error("{unit} failed after all fallbacks: {message}")]
    Exhausted {
        /// Human-readable name of the unit (chunk, batch, entry range)
        unit: String,
        /// Error reported by the last fallback
        message: String,
    },

    /// The generator stopped before producing a complete document
    #[error("Generation incomplete after {rounds} rounds")]
    Incomplete {
        /// Number of requests issued
        rounds: usize,
    },

    /// The run was cancelled
    #[error("Operation aborted")]
    Aborted,
}

impl TranslationError {
    /// Whether this error is the result of cancellation
    pub fn is_aborted(&self) -> bool {
        match self {
            Self::Aborted => true,
            Self::Provider(e) => e.is_aborted(),
            _ => false,
        }
    }

    /// Collapse an error into the summarized form reported for a unit of work
    pub fn exhausted(unit: impl Into<String>, last: &TranslationError) -> Self {
        if last.is_aborted() {
            return Self::Aborted;
        }
        Self::Exhausted {
            unit: unit.into(),
            message: last.to_string(),
        }
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A job of the same kind is already running
    #[error("A {0} job is already running")]
    Busy(&'static str),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
