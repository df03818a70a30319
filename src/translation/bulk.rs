/*!
 * Bulk translation through a machine translation provider.
 *
 * Entries are packed into chunks, translated by a worker pool and unpacked
 * back into per-entry text. Each chunk climbs an escalation ladder when the
 * response does not look right:
 *
 * 1. verbatim resend with the primary separator
 * 2. resend with alternate separators, drawn round-robin from a shared pool
 * 3. line-by-line translation of the chunk
 *
 * Transport errors are retried with backoff inside every step.
 */

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::errors::{ProviderError, TranslationError};
use crate::providers::BulkProvider;
use crate::subtitle_processor::SubtitleDocument;

use super::ProgressUpdate;
use super::chunking::{
    Chunk, DEFAULT_CHUNK_MAX_CHARS, EMPTY_PLACEHOLDER, PRIMARY_SEPARATOR, SEPARATOR_POOL,
    Separator, fit_line_count, pack_chunks, unpack_chunk,
};
use super::scheduler::{DEFAULT_POOL_SIZE, RetryPolicy, retry_with_backoff, run_indexed_pool};

/// Options for the bulk translation path
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Target language code understood by the provider
    pub target_language: String,
    /// Chunk budget in characters
    pub chunk_max_chars: usize,
    /// Concurrent chunk workers
    pub pool_size: usize,
    /// Verbatim sends for chunks long enough for the unchanged-text check
    pub verbatim_attempts: u32,
    /// Sends with alternate separators before going line by line
    pub alternate_attempts: u32,
    /// Minimum cleaned source length for the unchanged-text check
    pub unchanged_min_chars: usize,
    /// Shared-prefix share above which a response counts as unchanged
    pub unchanged_prefix_ratio: f64,
    /// Retry policy for every provider call
    pub retry: RetryPolicy,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            target_language: "en".to_string(),
            chunk_max_chars: DEFAULT_CHUNK_MAX_CHARS,
            pool_size: DEFAULT_POOL_SIZE,
            verbatim_attempts: 3,
            alternate_attempts: 2,
            unchanged_min_chars: 40,
            unchanged_prefix_ratio: 0.9,
            retry: RetryPolicy::default(),
        }
    }
}

/// Collapse separators, placeholders and whitespace for comparisons
fn clean_for_comparison(text: &str, separator: &Separator) -> String {
    separator
        .strip_from(text)
        .replace(EMPTY_PLACEHOLDER, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn common_prefix_chars(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

/// Bulk translator over a provider
#[derive(Debug)]
pub struct BulkTranslator<P: BulkProvider> {
    provider: P,
    options: BulkOptions,
    separator_cursor: AtomicUsize,
}

impl<P: BulkProvider> BulkTranslator<P> {
    /// Create a translator
    pub fn new(provider: P, options: BulkOptions) -> Self {
        Self {
            provider,
            options,
            separator_cursor: AtomicUsize::new(0),
        }
    }

    /// Options in use
    pub fn options(&self) -> &BulkOptions {
        &self.options
    }

    /// Provider behind this translator
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Whether a chunk's source is long enough for the unchanged-text check
    pub fn unchanged_check_applies(&self, source: &str, separator: &Separator) -> bool {
        clean_for_comparison(source, separator).chars().count() >= self.options.unchanged_min_chars
    }

    /// Whether the provider echoed the source instead of translating it
    pub fn looks_unchanged(&self, source: &str, translated: &str, separator: &Separator) -> bool {
        if !self.unchanged_check_applies(source, separator) {
            return false;
        }
        let source = clean_for_comparison(source, separator);
        let translated = clean_for_comparison(translated, separator);
        if source == translated {
            return true;
        }

        let source_len = source.chars().count();
        common_prefix_chars(&source, &translated) as f64 > self.options.unchanged_prefix_ratio * source_len as f64
    }

    fn next_alternate(&self) -> &'static Separator {
        let i = self.separator_cursor.fetch_add(1, Ordering::Relaxed);
        &SEPARATOR_POOL[i % SEPARATOR_POOL.len()]
    }

    async fn send(&self, text: &str, label: &str, cancel: &CancellationToken) -> Result<String, ProviderError> {
        let target = self.options.target_language.as_str();
        retry_with_backoff(&self.options.retry, cancel, label, || {
            self.provider.translate(text, target, cancel)
        })
        .await
    }

    /// One send with `separator`, validated by both heuristics.
    ///
    /// A response that fails the separator count is also returned in the
    /// error slot so the caller can fall back on redistribution.
    async fn attempt(
        &self,
        chunk: &Chunk,
        separator: &Separator,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, (TranslationError, Option<String>)> {
        let source = chunk.render(separator);
        let translated = self.send(&source, label, cancel).await.map_err(|e| (e.into(), None))?;

        if translated.trim().is_empty() {
            return Err((TranslationError::Content("provider returned empty text".to_string()), None));
        }

        let expected = chunk.len() - 1;
        let found = separator.count_in(&translated);
        if found != expected {
            return Err((
                TranslationError::Content(format!("expected {} separators, found {}", expected, found)),
                Some(translated),
            ));
        }

        if self.looks_unchanged(&source, &translated, separator) {
            return Err((TranslationError::Content("provider returned the source unchanged".to_string()), None));
        }

        Ok(unpack_chunk(&chunk.segments, &translated, separator))
    }

    /// Translate every line of a chunk on its own.
    ///
    /// Lines that keep failing keep their source text; the chunk only fails
    /// when no line could be translated.
    async fn translate_lines(
        &self,
        chunk: &Chunk,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, TranslationError> {
        let mut out = Vec::with_capacity(chunk.len());
        let mut attempted = 0;
        let mut failed = 0;
        let mut last_error = None;

        for (offset, segment) in chunk.segments.iter().enumerate() {
            if segment.chars().all(|c| c == EMPTY_PLACEHOLDER) {
                out.push(String::new());
                continue;
            }
            attempted += 1;

            let line_label = format!("{} line {}", label, chunk.start + offset + 1);
            match self.send(segment, &line_label, cancel).await {
                Ok(text) if !text.trim().is_empty() => out.push(text.trim().to_string()),
                Ok(_) => {
                    failed += 1;
                    last_error = Some(TranslationError::Content("provider returned empty text".to_string()));
                    out.push(segment.clone());
                }
                Err(e) if e.is_aborted() => return Err(TranslationError::Aborted),
                Err(e) if e.is_auth() => return Err(e.into()),
                Err(e) => {
                    warn!("{}: keeping source text: {}", line_label, e);
                    failed += 1;
                    last_error = Some(e.into());
                    out.push(segment.clone());
                }
            }
        }

        match last_error {
            Some(e) if attempted > 0 && failed == attempted => Err(e),
            _ => Ok(out),
        }
    }

    /// Translate one chunk through the escalation ladder
    pub async fn translate_chunk(
        &self,
        chunk: &Chunk,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, TranslationError> {
        let label = format!("chunk {}-{}", chunk.start + 1, chunk.start + chunk.len());
        let mut last_error = None;
        let mut mismatched: Option<(String, &Separator)> = None;

        let verbatim = if self.unchanged_check_applies(&chunk.render(&PRIMARY_SEPARATOR), &PRIMARY_SEPARATOR) {
            self.options.verbatim_attempts.max(1)
        } else {
            1
        };

        let alternates = (0..self.options.alternate_attempts).map(|_| self.next_alternate());
        let ladder = std::iter::repeat_n(&PRIMARY_SEPARATOR, verbatim as usize).chain(alternates);

        for (step, separator) in ladder.enumerate() {
            if cancel.is_cancelled() {
                return Err(TranslationError::Aborted);
            }
            match self.attempt(chunk, separator, &label, cancel).await {
                Ok(texts) => {
                    if step > 0 {
                        debug!("{} recovered at step {} with separator '{}'", label, step + 1, separator.bare);
                    }
                    return Ok(texts);
                }
                Err((e, _)) if e.is_aborted() => return Err(TranslationError::Aborted),
                Err((TranslationError::Provider(e), _)) if e.is_auth() => {
                    error!("{}: authentication failed: {}", label, e);
                    return Err(TranslationError::Provider(e));
                }
                Err((e, response)) => {
                    debug!("{} step {} failed: {}", label, step + 1, e);
                    if let Some(response) = response {
                        mismatched = Some((response, separator));
                    }
                    last_error = Some(e);
                }
            }
        }

        if chunk.len() > 1 {
            warn!("{}: separators keep failing, translating line by line", label);
            match self.translate_lines(chunk, &label, cancel).await {
                Ok(texts) => return Ok(texts),
                Err(e) if e.is_aborted() => return Err(TranslationError::Aborted),
                Err(TranslationError::Provider(e)) if e.is_auth() => return Err(TranslationError::Provider(e)),
                Err(e) => last_error = Some(e),
            }
        }

        if let Some((response, separator)) = mismatched {
            warn!("{}: falling back to proportional redistribution", label);
            return Ok(unpack_chunk(&chunk.segments, &response, separator));
        }

        let last = last_error.unwrap_or_else(|| TranslationError::Content("no attempt was made".to_string()));
        Err(TranslationError::exhausted(label, &last))
    }

    /// Translate texts chunk by chunk, reporting each finished chunk
    async fn run_chunks<F>(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<Vec<String>, TranslationError>
    where
        F: FnMut(usize, usize, Range<usize>, &[String]),
    {
        let chunks = pack_chunks(texts, self.options.chunk_max_chars, &PRIMARY_SEPARATOR);
        let ranges: Vec<Range<usize>> = chunks.iter().map(Chunk::range).collect();
        let total = chunks.len();
        let mut completed = 0;
        info!("Translating {} entries in {} chunks", texts.len(), total);

        let results = run_indexed_pool(
            chunks,
            self.options.pool_size,
            cancel,
            |_, chunk| async move { self.translate_chunk(&chunk, cancel).await },
            |index, result| {
                completed += 1;
                if let Ok(translated) = result {
                    on_chunk(completed, total, ranges[index].clone(), translated);
                }
            },
        )
        .await;

        let mut output = texts.to_vec();
        let mut failure = None;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(translated) => {
                    for (slot, text) in output[ranges[index].clone()].iter_mut().zip(translated) {
                        *slot = text;
                    }
                }
                Err(e) => {
                    if !e.is_aborted() {
                        error!("Chunk {} failed: {}", index + 1, e);
                    }
                    failure = Some(match failure {
                        Some(TranslationError::Aborted) => TranslationError::Aborted,
                        _ => e,
                    });
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(output),
        }
    }

    /// Translate plain texts; entries come back flattened to one line
    pub async fn translate_texts(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, TranslationError> {
        self.run_chunks(texts, cancel, |_, _, _, _| {}).await
    }

    /// Translate a document into a parallel document with the same timings.
    ///
    /// `on_progress` receives a preview after each finished chunk; entries of
    /// unfinished chunks still show their source text.
    pub async fn translate_document<F>(
        &self,
        document: &SubtitleDocument,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<SubtitleDocument, TranslationError>
    where
        F: FnMut(ProgressUpdate<'_>),
    {
        let sources = document.texts();
        let mut preview = document.clone();

        let translated = self
            .run_chunks(&sources, cancel, |completed, total, range, texts| {
                for (entry, text) in preview.entries[range].iter_mut().zip(texts) {
                    entry.text = fit_line_count(text, entry.line_count());
                }
                on_progress(ProgressUpdate { completed, total, preview: &preview });
            })
            .await?;

        let fitted: Vec<String> = translated
            .iter()
            .zip(&document.entries)
            .map(|(text, entry)| fit_line_count(text, entry.line_count()))
            .collect();

        Ok(document.with_texts(&fitted))
    }
}
