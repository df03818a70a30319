/*!
 * Long-form summaries through a token-limited generative provider.
 *
 * The provider rarely finishes a long document in one response. Each round
 * that ends without the end marker (or hits the token limit) is followed by a
 * continuation request anchored on the tail of the output so far, and the
 * answer is merged without repeating the overlap.
 */

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::errors::TranslationError;
use crate::providers::{GenerationRequest, GenerationResponse, GenerationSettings, GenerativeProvider};
use crate::subtitle_processor::{SubtitleDocument, format_timestamp};
use crate::translation::ApiKeyRing;
use crate::translation::prompts::{END_MARKER, continuation_prompt, summary_prompt};
use crate::translation::scheduler::{RetryPolicy, retry_with_backoff};

/// Options for summary generation
#[derive(Debug, Clone)]
pub struct SummaryOptions {
    /// Output language; empty means the language of the subtitles
    pub language: String,
    /// Transcript size limit in characters
    pub max_input_chars: usize,
    /// Output tail quoted in continuation requests
    pub anchor_chars: usize,
    /// Request limit per summary
    pub max_rounds: usize,
    /// Retry policy for every provider call
    pub retry: RetryPolicy,
    /// Sampling settings
    pub settings: GenerationSettings,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            language: String::new(),
            max_input_chars: 120_000,
            anchor_chars: 200,
            max_rounds: 5,
            retry: RetryPolicy::default(),
            settings: GenerationSettings::default(),
        }
    }
}

/// Target key point count range for a document of this length
pub fn bullet_range(duration_ms: u64) -> (usize, usize) {
    let minutes = (duration_ms / 60_000) as usize;
    let low = (minutes / 4).clamp(3, 15);
    let high = (minutes / 2).clamp(5, 30).max(low + 2);
    (low, high)
}

/// Compact `HH:MM:SS text` transcript, cut to `max_chars`
pub fn summary_transcript(document: &SubtitleDocument, max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for entry in &document.entries {
        let stamp = format_timestamp(entry.start_ms);
        let line = format!(
            "{} {}\n",
            stamp.split(',').next().unwrap_or(&stamp),
            entry.text.split_whitespace().collect::<Vec<_>>().join(" ")
        );
        let len = line.chars().count();
        if used + len > max_chars {
            debug!("Summary input clamped at {} characters", used);
            break;
        }
        used += len;
        out.push_str(&line);
    }
    out
}

/// Remove the end marker and anything after it
pub fn strip_end_marker(text: &str) -> String {
    let body = match text.find(END_MARKER) {
        Some(pos) => &text[..pos],
        None => text,
    };
    body.trim_end().to_string()
}

/// Tail of `text` used as a continuation anchor, starting on a word boundary
pub fn anchor_of(text: &str, max_chars: usize) -> String {
    let text = text.trim_end();
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let start = text.char_indices().nth(total - max_chars).map(|(i, _)| i).unwrap_or(0);
    let tail = &text[start..];
    let starts_mid_word = !text[..start].ends_with(char::is_whitespace);
    match tail.find(char::is_whitespace) {
        Some(space) if starts_mid_word => tail[space..].trim_start().to_string(),
        _ => tail.to_string(),
    }
}

fn join_parts(existing: &str, rest: &str) -> String {
    let mut merged = existing.to_string();
    merged.push_str(rest);
    merged
}

/// Merge a continuation into the output so far.
///
/// When the anchor shows up in the continuation only the text after it is
/// appended. Otherwise the longest word-aligned suffix of `existing` that
/// the continuation starts with is skipped. Failing both, the continuation
/// is appended after a single space.
pub fn merge_continuation(existing: &str, continuation: &str, anchor: &str) -> String {
    let anchor = anchor.trim();
    if !anchor.is_empty() {
        if let Some(pos) = continuation.find(anchor) {
            return join_parts(existing, &continuation[pos + anchor.len()..]);
        }
    }

    let existing_trimmed = existing.trim_end();
    let lead = continuation.trim_start();
    let boundaries = std::iter::once(0).chain(
        existing_trimmed
            .char_indices()
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8()),
    );
    for start in boundaries {
        let suffix = &existing_trimmed[start..];
        if suffix.is_empty() || suffix.len() > lead.len() || !lead.starts_with(suffix) {
            continue;
        }
        let rest = &lead[suffix.len()..];
        if rest.is_empty() || !rest.starts_with(char::is_alphanumeric) {
            return join_parts(existing_trimmed, rest);
        }
    }

    if lead.is_empty() {
        return existing.to_string();
    }
    if existing.ends_with(char::is_whitespace) || continuation.starts_with(char::is_whitespace) {
        return join_parts(existing, continuation);
    }
    format!("{} {}", existing, lead)
}

/// Summary generator over a generative provider
#[derive(Debug)]
pub struct SummaryGenerator<G: GenerativeProvider> {
    provider: G,
    keys: ApiKeyRing,
    options: SummaryOptions,
}

impl<G: GenerativeProvider> SummaryGenerator<G> {
    /// Create a generator
    pub fn new(provider: G, keys: ApiKeyRing, options: SummaryOptions) -> Self {
        Self { provider, keys, options }
    }

    /// Provider behind this generator
    pub fn provider(&self) -> &G {
        &self.provider
    }

    async fn request(&self, prompt: &str, round: usize, cancel: &CancellationToken) -> Result<GenerationResponse, TranslationError> {
        let label = format!("summary round {}", round);
        let label = label.as_str();
        let response = self
            .keys
            .run(|api_key| {
                let request = GenerationRequest {
                    prompt: prompt.to_string(),
                    api_key,
                    settings: self.options.settings.clone(),
                };
                async move {
                    retry_with_backoff(&self.options.retry, cancel, label, || {
                        self.provider.generate_stream(&request, cancel)
                    })
                    .await
                }
            })
            .await?;
        Ok(response)
    }

    /// Generate the Markdown summary of a document.
    ///
    /// `on_round` sees the merged output after every round. Running out of
    /// rounds before the end marker appears is an error.
    pub async fn generate<F>(
        &self,
        document: &SubtitleDocument,
        cancel: &CancellationToken,
        mut on_round: F,
    ) -> Result<String, TranslationError>
    where
        F: FnMut(usize, &str),
    {
        let transcript = summary_transcript(document, self.options.max_input_chars);
        let language = if self.options.language.is_empty() {
            "the same language as the subtitles"
        } else {
            self.options.language.as_str()
        };
        let base_prompt = summary_prompt(&transcript, language, bullet_range(document.duration_ms()));

        let mut output = String::new();
        for round in 1..=self.options.max_rounds.max(1) {
            if cancel.is_cancelled() {
                return Err(TranslationError::Aborted);
            }

            let response = if round == 1 {
                let response = self.request(&base_prompt, round, cancel).await?;
                output = response.text.clone();
                response
            } else {
                let anchor = anchor_of(&output, self.options.anchor_chars);
                let prompt = continuation_prompt(&base_prompt, &anchor);
                let response = self.request(&prompt, round, cancel).await?;
                output = merge_continuation(&output, &response.text, &anchor);
                response
            };
            on_round(round, &output);

            if output.contains(END_MARKER) {
                if response.hit_token_limit() {
                    debug!("Summary hit the token limit after the end marker, keeping it");
                }
                info!("Summary complete after {} round(s)", round);
                return Ok(strip_end_marker(&output));
            }

            warn!(
                "Summary round {} ended without the end marker (finish reason: {}), continuing",
                round,
                response.finish_reason.as_deref().unwrap_or("none")
            );
        }

        Err(TranslationError::Incomplete { rounds: self.options.max_rounds.max(1) })
    }
}
