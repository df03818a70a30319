/*!
 * Prompt construction for the generative provider.
 *
 * This module provides:
 * - The batch translation contract and its strict variant
 * - The summary layout and continuation directive
 */

pub mod templates;

// Re-export main types
pub use templates::{
    END_MARKER, PromptTemplate, batch_translation_prompt, continuation_prompt, summary_prompt,
};
