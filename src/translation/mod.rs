/*!
 * Subtitle translation through external providers.
 *
 * This module is split into several submodules:
 *
 * - `chunking`: packing entries into separator-joined blocks and back
 * - `bulk`: machine translation of packed chunks with an escalation ladder
 * - `batch`: id-addressed JSON batches for generative providers
 * - `json_repair`: extraction and repair of batch responses
 * - `prompts`: prompt templates for batches and summaries
 * - `scheduler`: retry with backoff, worker pool and job slots
 */

use crate::subtitle_processor::SubtitleDocument;

// Re-export main types for easier usage
pub use self::batch::{ApiKeyRing, BatchItem, BatchOptions, BatchTranslator, normalize_api_keys};
pub use self::bulk::{BulkOptions, BulkTranslator};
pub use self::chunking::{Chunk, Separator, pack_chunks, unpack_chunk};
pub use self::json_repair::BatchParse;
pub use self::scheduler::{JobGuard, JobSlot, RetryPolicy};

/// Progress report emitted after each finished chunk or batch
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate<'a> {
    /// Units finished so far
    pub completed: usize,
    /// Units in the run
    pub total: usize,
    /// Document as translated so far; unfinished entries show source text
    pub preview: &'a SubtitleDocument,
}

// Submodules
pub mod batch;
pub mod bulk;
pub mod chunking;
pub mod json_repair;
pub mod prompts;
pub mod scheduler;
