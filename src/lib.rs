/*!
 * # sublingo - subtitle translation through lossy providers
 *
 * A Rust library for translating SRT subtitles with machine translation
 * and generative providers that drop separators, merge lines, truncate
 * output or return malformed JSON.
 *
 * ## Features
 *
 * - SRT parsing, normalization and serialization
 * - Google-style bulk translation of separator-joined chunks:
 *   - verbatim retries, alternate separators and per-line fallback
 *   - proportional redistribution when segment counts disagree
 * - Gemini-style JSON batch translation:
 *   - JSON extraction and repair
 *   - strict re-prompts, range bisection and bulk fallback
 *   - API key rotation on authentication failures
 * - Bounded-concurrency worker pool with retries and cancellation
 * - Long-form Markdown summaries stitched from truncated responses
 * - ISO 639-1 and ISO 639-2 language codes with region subtags
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `subtitle_processor`: Subtitle document model
 * - `translation`: Translation pipelines:
 *   - `translation::chunking`: Chunk packing and unpacking
 *   - `translation::bulk`: Bulk provider client
 *   - `translation::batch`: Batch provider client
 *   - `translation::json_repair`: Batch response repair
 *   - `translation::scheduler`: Retry, worker pool and job slots
 * - `summary`: Continuation-based summary generator
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `providers`: Provider clients:
 *   - `providers::google`: Google Translate client
 *   - `providers::gemini`: Gemini client
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod providers;
pub mod subtitle_processor;
pub mod summary;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::{Config, TranslationEngine};
pub use errors::{AppError, ProviderError, SubtitleError, TranslationError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use subtitle_processor::{SubtitleDocument, SubtitleEntry};
pub use summary::{SummaryGenerator, SummaryOptions};
pub use translation::{BatchTranslator, BulkTranslator, ProgressUpdate};
