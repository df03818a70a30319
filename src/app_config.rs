use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::language_utils;
use crate::providers::GenerationSettings;
use crate::providers::gemini::DEFAULT_GEMINI_ENDPOINT;
use crate::providers::google::DEFAULT_GOOGLE_ENDPOINT;
use crate::summary::SummaryOptions;
use crate::translation::batch::{
    BatchOptions, DEFAULT_BATCH_MAX_CHARS, DEFAULT_BATCH_MAX_ITEMS, DEFAULT_MAX_BISECT_DEPTH,
    normalize_api_keys,
};
use crate::translation::bulk::BulkOptions;
use crate::translation::chunking::DEFAULT_CHUNK_MAX_CHARS;
use crate::translation::scheduler::{DEFAULT_POOL_SIZE, RetryPolicy};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Target language code (ISO 639-1, optionally with a region like `pt-BR`)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation engine; chosen from the configured keys when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<TranslationEngine>,

    /// Bulk provider settings
    #[serde(default)]
    pub bulk: BulkConfig,

    /// Generative provider settings
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Summary settings
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Retry settings shared by every provider call
    #[serde(default)]
    pub retry: RetryConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation engine
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationEngine {
    // @engine: Google Translate, chunked bulk requests
    #[default]
    Google,
    // @engine: Gemini, JSON batches with bulk fallback
    Gemini,
}

impl TranslationEngine {
    // @returns: Capitalized engine name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Google => "Google Translate",
            Self::Gemini => "Gemini",
        }
    }
}

impl std::fmt::Display for TranslationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Google => write!(f, "google"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for TranslationEngine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "gemini" => Ok(Self::Gemini),
            _ => Err(anyhow!("Invalid translation engine: {}", s)),
        }
    }
}

/// Bulk provider configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BulkConfig {
    // @field: Service URL, empty for the public endpoint
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_bulk_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Max chars per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,

    // @field: Concurrent chunk workers
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    // @field: Verbatim sends for long chunks
    #[serde(default = "default_verbatim_attempts")]
    pub verbatim_attempts: u32,

    // @field: Sends with alternate separators
    #[serde(default = "default_alternate_attempts")]
    pub alternate_attempts: u32,

    // @field: Minimum source length for the unchanged-text check
    #[serde(default = "default_unchanged_min_chars")]
    pub unchanged_min_chars: usize,

    // @field: Shared-prefix ratio that counts as unchanged
    #[serde(default = "default_unchanged_prefix_ratio")]
    pub unchanged_prefix_ratio: f64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: default_bulk_timeout_secs(),
            chunk_max_chars: default_chunk_max_chars(),
            pool_size: default_pool_size(),
            verbatim_attempts: default_verbatim_attempts(),
            alternate_attempts: default_alternate_attempts(),
            unchanged_min_chars: default_unchanged_min_chars(),
            unchanged_prefix_ratio: default_unchanged_prefix_ratio(),
        }
    }
}

/// Generative provider configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    // @field: API keys; entries may hold several keys separated by commas or line breaks
    #[serde(default)]
    pub api_keys: Vec<String>,

    // @field: Model name
    #[serde(default = "default_gemini_model")]
    pub model: String,

    // @field: Service URL
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_gemini_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Max items per batch
    #[serde(default = "default_batch_max_items")]
    pub batch_max_items: usize,

    // @field: Max serialized chars per batch
    #[serde(default = "default_batch_max_chars")]
    pub batch_max_chars: usize,

    // @field: Bisection depth limit
    #[serde(default = "default_max_bisect_depth")]
    pub max_bisect_depth: usize,

    /// Temperature parameter for text generation (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    // @field: Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    // @field: Top-k sampling cutoff
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    // @field: Output token limit for translation batches
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    // @field: Thinking budget, omitted from requests when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: default_gemini_model(),
            endpoint: default_gemini_endpoint(),
            timeout_secs: default_gemini_timeout_secs(),
            batch_max_items: default_batch_max_items(),
            batch_max_chars: default_batch_max_chars(),
            max_bisect_depth: default_max_bisect_depth(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
            thinking_budget: None,
        }
    }
}

impl GeminiConfig {
    /// Sampling settings with the given output limit
    pub fn generation_settings(&self, max_output_tokens: u32) -> GenerationSettings {
        GenerationSettings {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_output_tokens,
            thinking_budget: self.thinking_budget,
        }
    }
}

/// Summary configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SummaryConfig {
    // @field: Output language code; empty follows the subtitles
    #[serde(default = "String::new")]
    pub language: String,

    // @field: Transcript size limit
    #[serde(default = "default_summary_max_input_chars")]
    pub max_input_chars: usize,

    // @field: Output tail quoted in continuation requests
    #[serde(default = "default_anchor_chars")]
    pub anchor_chars: usize,

    // @field: Request limit per summary
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    // @field: Output token limit per round
    #[serde(default = "default_summary_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            language: String::new(),
            max_input_chars: default_summary_max_input_chars(),
            anchor_chars: default_anchor_chars(),
            max_rounds: default_max_rounds(),
            max_output_tokens: default_summary_max_output_tokens(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    /// Attempts per request, including the first one
    #[serde(default = "default_retry_count")]
    pub max_attempts: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_count(),
            base_delay_ms: default_retry_backoff_ms(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_bulk_timeout_secs() -> u64 {
    30
}

fn default_chunk_max_chars() -> usize {
    DEFAULT_CHUNK_MAX_CHARS
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_verbatim_attempts() -> u32 {
    3
}

fn default_alternate_attempts() -> u32 {
    2
}

fn default_unchanged_min_chars() -> usize {
    40
}

fn default_unchanged_prefix_ratio() -> f64 {
    0.9
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_endpoint() -> String {
    DEFAULT_GEMINI_ENDPOINT.to_string()
}

fn default_gemini_timeout_secs() -> u64 {
    300
}

fn default_batch_max_items() -> usize {
    DEFAULT_BATCH_MAX_ITEMS
}

fn default_batch_max_chars() -> usize {
    DEFAULT_BATCH_MAX_CHARS
}

fn default_max_bisect_depth() -> usize {
    DEFAULT_MAX_BISECT_DEPTH
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    50
}

fn default_max_output_tokens() -> u32 {
    65_536
}

fn default_summary_max_input_chars() -> usize {
    120_000
}

fn default_anchor_chars() -> usize {
    200
}

fn default_max_rounds() -> usize {
    5
}

fn default_summary_max_output_tokens() -> u32 {
    8_192
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

impl Config {
    /// Load a configuration file, or write the defaults there when it is missing.
    ///
    /// Returns the configuration and whether it was freshly created.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok((config, false));
        }

        let config = Config::default();
        config.save(path)?;
        Ok((config, true))
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Configured API keys, split, trimmed and de-duplicated
    pub fn api_keys(&self) -> Vec<String> {
        normalize_api_keys(&self.gemini.api_keys)
    }

    /// Add keys given on the command line or through the environment
    pub fn add_api_keys<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.gemini.api_keys.extend(keys.into_iter().map(|k| k.as_ref().to_string()));
        self.gemini.api_keys = normalize_api_keys(&self.gemini.api_keys);
    }

    /// Engine in use: the explicit choice, else Gemini when keys are present
    pub fn effective_engine(&self) -> TranslationEngine {
        match self.engine {
            Some(engine) => engine,
            None if !self.api_keys().is_empty() => TranslationEngine::Gemini,
            None => TranslationEngine::Google,
        }
    }

    /// Target language code in the form the given engine expects
    pub fn target_for(&self, engine: TranslationEngine) -> String {
        language_utils::engine_language_code(&self.target_language, engine)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        language_utils::validate_language_code(&self.target_language)
            .with_context(|| format!("Invalid target language: {}", self.target_language))?;

        if !self.summary.language.is_empty() {
            language_utils::validate_language_code(&self.summary.language)
                .with_context(|| format!("Invalid summary language: {}", self.summary.language))?;
        }

        if self.effective_engine() == TranslationEngine::Gemini && self.api_keys().is_empty() {
            return Err(anyhow!("A Gemini API key is required for Gemini translation"));
        }

        if self.bulk.chunk_max_chars == 0 || self.gemini.batch_max_chars == 0 || self.gemini.batch_max_items == 0 {
            return Err(anyhow!("Chunk and batch budgets must be greater than zero"));
        }

        if self.bulk.pool_size == 0 {
            return Err(anyhow!("Worker pool size must be greater than zero"));
        }

        if !(0.0..=1.0).contains(&self.bulk.unchanged_prefix_ratio) {
            return Err(anyhow!("unchanged_prefix_ratio must be between 0 and 1"));
        }

        Ok(())
    }

    /// Check the extra requirements of summary generation
    pub fn validate_summary(&self) -> Result<()> {
        if self.api_keys().is_empty() {
            return Err(anyhow!("A Gemini API key is required for summaries"));
        }
        if self.summary.max_rounds == 0 || self.summary.max_input_chars == 0 {
            return Err(anyhow!("Summary round and input limits must be greater than zero"));
        }
        Ok(())
    }

    /// Retry policy from the retry section
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts, self.retry.base_delay_ms)
    }

    /// Options for the bulk translator
    pub fn bulk_options(&self) -> BulkOptions {
        BulkOptions {
            target_language: self.target_for(TranslationEngine::Google),
            chunk_max_chars: self.bulk.chunk_max_chars,
            pool_size: self.bulk.pool_size,
            verbatim_attempts: self.bulk.verbatim_attempts,
            alternate_attempts: self.bulk.alternate_attempts,
            unchanged_min_chars: self.bulk.unchanged_min_chars,
            unchanged_prefix_ratio: self.bulk.unchanged_prefix_ratio,
            retry: self.retry_policy(),
        }
    }

    /// Options for the batch translator
    pub fn batch_options(&self) -> BatchOptions {
        let code = self.target_for(TranslationEngine::Gemini);
        BatchOptions {
            target_language: language_utils::prompt_language(&code),
            max_items: self.gemini.batch_max_items,
            max_chars: self.gemini.batch_max_chars,
            max_bisect_depth: self.gemini.max_bisect_depth,
            retry: self.retry_policy(),
            settings: self.gemini.generation_settings(self.gemini.max_output_tokens),
        }
    }

    /// Options for the summary generator; `language` overrides the configured one
    pub fn summary_options(&self, language: Option<&str>) -> SummaryOptions {
        let code = language
            .map(str::to_string)
            .unwrap_or_else(|| self.summary.language.clone());
        SummaryOptions {
            language: if code.is_empty() { String::new() } else { language_utils::prompt_language(&code) },
            max_input_chars: self.summary.max_input_chars,
            anchor_chars: self.summary.anchor_chars,
            max_rounds: self.summary.max_rounds,
            retry: self.retry_policy(),
            settings: self.gemini.generation_settings(self.summary.max_output_tokens),
        }
    }

    /// Bulk endpoint with the public default applied
    pub fn bulk_endpoint(&self) -> String {
        if self.bulk.endpoint.is_empty() {
            DEFAULT_GOOGLE_ENDPOINT.to_string()
        } else {
            self.bulk.endpoint.clone()
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            target_language: default_target_language(),
            engine: None,
            bulk: BulkConfig::default(),
            gemini: GeminiConfig::default(),
            summary: SummaryConfig::default(),
            retry: RetryConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
