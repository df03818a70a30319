/*!
 * Batch translation through a generative provider.
 *
 * Entries are sent in id-addressed JSON batches. A batch whose answer cannot
 * be used goes through a fixed ladder:
 *
 * 1. the same request again with a strict "JSON only" directive
 * 2. bisection: each half is translated on its own, recursively, up to a depth limit
 * 3. a single item (or a range at the depth limit) goes through the bulk provider
 *
 * Batches run one at a time. Authentication failures rotate through the
 * configured API keys; nothing else does.
 */

use std::future::Future;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::{ProviderError, TranslationError};
use crate::providers::{BulkProvider, GenerationRequest, GenerationSettings, GenerativeProvider};
use crate::subtitle_processor::SubtitleDocument;

use super::ProgressUpdate;
use super::bulk::BulkTranslator;
use super::chunking::fit_line_count;
use super::json_repair::{BatchParse, map_batch_response};
use super::prompts::batch_translation_prompt;
use super::scheduler::{RetryPolicy, retry_with_backoff};

/// Default item limit per batch
pub const DEFAULT_BATCH_MAX_ITEMS: usize = 500;

/// Default serialized size limit per batch
pub const DEFAULT_BATCH_MAX_CHARS: usize = 45_000;

/// Default bisection depth limit
pub const DEFAULT_MAX_BISECT_DEPTH: usize = 8;

/// One protocol unit; `id` is the entry's 0-based position in the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Position of the entry in the document
    pub id: u64,
    /// Entry text, line breaks included
    pub text: String,
}

/// Split texts into contiguous batches bounded by item count and serialized size.
///
/// An item larger than `max_chars` on its own still gets a batch of its own.
pub fn build_batches(texts: &[String], max_items: usize, max_chars: usize) -> Vec<Range<usize>> {
    let max_items = max_items.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    let mut size = 2; // enclosing brackets

    for (i, text) in texts.iter().enumerate() {
        let item = BatchItem { id: i as u64, text: text.clone() };
        let item_size = serde_json::to_string(&item).map(|s| s.chars().count()).unwrap_or(text.len()) + 1;

        let count = i - start;
        if count > 0 && (count >= max_items || size + item_size > max_chars) {
            batches.push(start..i);
            start = i;
            size = 2;
        }
        size += item_size;
    }

    if start < texts.len() {
        batches.push(start..texts.len());
    }
    batches
}

/// Split raw key inputs on commas and line breaks, trim them and drop
/// duplicates while keeping the first occurrence order.
pub fn normalize_api_keys<I, S>(inputs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut keys: Vec<String> = Vec::new();
    for input in inputs {
        for part in input.as_ref().split([',', '\n', '\r']) {
            let key = part.trim();
            if !key.is_empty() && !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }
    keys
}

/// Rotating set of API keys
#[derive(Debug)]
pub struct ApiKeyRing {
    keys: Vec<String>,
    current: AtomicUsize,
}

impl ApiKeyRing {
    /// Create a ring from already normalized keys
    pub fn new(keys: Vec<String>) -> Result<Self, TranslationError> {
        if keys.is_empty() {
            return Err(TranslationError::Provider(ProviderError::AuthenticationError(
                "no API key configured".to_string(),
            )));
        }
        Ok(Self { keys, current: AtomicUsize::new(0) })
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring has no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key in use
    pub fn current(&self) -> &str {
        &self.keys[self.current.load(Ordering::SeqCst) % self.keys.len()]
    }

    /// Move to the next key and return its 1-based number
    pub fn rotate(&self) -> usize {
        let next = (self.current.load(Ordering::SeqCst) + 1) % self.keys.len();
        self.current.store(next, Ordering::SeqCst);
        next + 1
    }

    /// Run `operation` with the current key, moving on to the next key after
    /// each authentication failure until every key was tried.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut tried = 0;
        loop {
            match operation(self.current().to_string()).await {
                Err(e) if e.is_auth() => {
                    tried += 1;
                    if tried >= self.keys.len() {
                        error!("All {} API keys were rejected", self.keys.len());
                        return Err(e);
                    }
                    let number = self.rotate();
                    warn!("API key rejected ({}), switching to key #{}", e, number);
                }
                other => return other,
            }
        }
    }
}

/// Options for the batch translation path
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Target language as it should appear in the prompt
    pub target_language: String,
    /// Item limit per batch
    pub max_items: usize,
    /// Serialized size limit per batch
    pub max_chars: usize,
    /// Bisection depth limit
    pub max_bisect_depth: usize,
    /// Retry policy for every provider call
    pub retry: RetryPolicy,
    /// Sampling settings
    pub settings: GenerationSettings,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            target_language: "English".to_string(),
            max_items: DEFAULT_BATCH_MAX_ITEMS,
            max_chars: DEFAULT_BATCH_MAX_CHARS,
            max_bisect_depth: DEFAULT_MAX_BISECT_DEPTH,
            retry: RetryPolicy::default(),
            settings: GenerationSettings::default(),
        }
    }
}

/// Batch translator with bulk fallback
#[derive(Debug)]
pub struct BatchTranslator<G: GenerativeProvider, B: BulkProvider> {
    provider: G,
    keys: ApiKeyRing,
    fallback: BulkTranslator<B>,
    options: BatchOptions,
}

impl<G: GenerativeProvider, B: BulkProvider> BatchTranslator<G, B> {
    /// Create a batch translator
    pub fn new(provider: G, keys: ApiKeyRing, fallback: BulkTranslator<B>, options: BatchOptions) -> Self {
        Self { provider, keys, fallback, options }
    }

    /// Key ring in use
    pub fn keys(&self) -> &ApiKeyRing {
        &self.keys
    }

    /// Generative provider behind this translator
    pub fn provider(&self) -> &G {
        &self.provider
    }

    /// Bulk translator used for ranges that cannot be batched
    pub fn fallback(&self) -> &BulkTranslator<B> {
        &self.fallback
    }

    /// Send one batch and read the answer
    async fn request_batch(
        &self,
        items: &[BatchItem],
        strict: bool,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchParse, ProviderError> {
        let prompt = batch_translation_prompt(items, &self.options.target_language, strict);

        let response = self
            .keys
            .run(|api_key| {
                let request = GenerationRequest {
                    prompt: prompt.clone(),
                    api_key,
                    settings: self.options.settings.clone(),
                };
                async move {
                    retry_with_backoff(&self.options.retry, cancel, label, || {
                        self.provider.generate(&request, cancel)
                    })
                    .await
                }
            })
            .await?;

        if let Some(tokens) = response.total_tokens {
            debug!("{}: {} tokens", label, tokens);
        }
        Ok(map_batch_response(&response.text, items))
    }

    /// Translate the entries in `range` through the full ladder
    fn translate_range<'a>(
        &'a self,
        texts: &'a [String],
        range: Range<usize>,
        depth: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<String>, TranslationError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(TranslationError::Aborted);
            }

            let label = format!("entries {}-{}", range.start + 1, range.end);
            let items: Vec<BatchItem> = range
                .clone()
                .map(|i| BatchItem { id: i as u64, text: texts[i].clone() })
                .collect();

            let mut last_error = None;
            for strict in [false, true] {
                match self.request_batch(&items, strict, &label, cancel).await {
                    Ok(BatchParse::Ok(translated)) => return Ok(translated),
                    Ok(rejected) => {
                        warn!("{}: {}{}", label, rejected.describe(), if strict { " after strict re-prompt" } else { "" });
                        last_error = Some(TranslationError::Content(format!("{} in response", rejected.describe())));
                    }
                    Err(e) if e.is_aborted() => return Err(TranslationError::Aborted),
                    Err(e) if e.is_auth() => return Err(TranslationError::exhausted(label, &e.into())),
                    Err(e) => {
                        warn!("{}: request failed: {}", label, e);
                        last_error = Some(e.into());
                    }
                }
            }

            if range.len() > 1 && depth < self.options.max_bisect_depth {
                let mid = range.start + range.len() / 2;
                info!("{}: splitting into {}-{} and {}-{}", label, range.start + 1, mid, mid + 1, range.end);
                let mut left = self.translate_range(texts, range.start..mid, depth + 1, cancel).await?;
                let right = self.translate_range(texts, mid..range.end, depth + 1, cancel).await?;
                left.extend(right);
                return Ok(left);
            }

            warn!("{}: falling back to bulk translation", label);
            match self.fallback.translate_texts(&texts[range.clone()], cancel).await {
                Ok(translated) => Ok(translated),
                Err(e) if e.is_aborted() => Err(TranslationError::Aborted),
                Err(e) => {
                    if let Some(previous) = last_error {
                        debug!("{}: batch error before fallback: {}", label, previous);
                    }
                    Err(TranslationError::exhausted(label, &e))
                }
            }
        })
    }

    /// Translate plain texts batch by batch
    pub async fn translate_texts(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, TranslationError> {
        self.translate_texts_with(texts, cancel, |_, _, _, _| {}).await
    }

    async fn translate_texts_with<F>(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
        mut on_batch: F,
    ) -> Result<Vec<String>, TranslationError>
    where
        F: FnMut(usize, usize, Range<usize>, &[String]),
    {
        let batches = build_batches(texts, self.options.max_items, self.options.max_chars);
        let total = batches.len();
        info!("Translating {} entries in {} batches", texts.len(), total);

        let mut output = texts.to_vec();
        for (index, range) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(TranslationError::Aborted);
            }
            let translated = self.translate_range(texts, range.clone(), 0, cancel).await?;
            for (slot, text) in output[range.clone()].iter_mut().zip(&translated) {
                slot.clone_from(text);
            }
            on_batch(index + 1, total, range, &translated);
        }
        Ok(output)
    }

    /// Translate a document into a parallel document with the same timings.
    ///
    /// `on_progress` receives a preview after each finished batch.
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
            .translate_texts_with(&sources, cancel, |completed, total, range, texts| {
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
