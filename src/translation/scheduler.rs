/*!
 * Bounded concurrency and retry scheduling.
 *
 * Shared by both translation paths: a retry helper with linear backoff that
 * honors cancellation, an index-addressed worker pool, and a job slot that
 * prevents two runs of the same kind from overlapping.
 */

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::errors::{ProviderError, TranslationError};

/// Default number of concurrent chunk workers
pub const DEFAULT_POOL_SIZE: usize = 7;

/// Retry settings for a single unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay multiplied by the attempt number between attempts
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// Create a policy from configuration values
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
///
/// Cancellation is checked before every attempt and interrupts the backoff
/// sleep. Cancelled runs always end in `ProviderError::Aborted`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::Aborted);
        }
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_aborted() => return Err(e),
            Err(e) if !e.is_retryable() || attempt >= policy.max_attempts => {
                if e.is_retryable() {
                    warn!("{}: giving up after {} attempts: {}", label, attempt, e);
                }
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!("{}: attempt {}/{} failed: {}. Retrying in {:?}", label, attempt, policy.max_attempts, e, delay);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProviderError::Aborted),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Run `task` over every item with at most `pool_size` in flight.
///
/// Each result lands in the slot of its input index, so completion order does
/// not matter. `on_complete` sees every finished result as soon as it arrives.
/// Items that start after cancellation resolve to `TranslationError::Aborted`.
pub async fn run_indexed_pool<I, T, F, Fut, C>(
    items: Vec<I>,
    pool_size: usize,
    cancel: &CancellationToken,
    task: F,
    mut on_complete: C,
) -> Vec<Result<T, TranslationError>>
where
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = Result<T, TranslationError>>,
    C: FnMut(usize, &Result<T, TranslationError>),
{
    let mut slots: Vec<Option<Result<T, TranslationError>>> = Vec::with_capacity(items.len());
    slots.resize_with(items.len(), || None);

    let task = &task;
    let mut completed = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| async move {
            if cancel.is_cancelled() {
                return (index, Err(TranslationError::Aborted));
            }
            (index, task(index, item).await)
        })
        .buffer_unordered(pool_size.max(1));

    while let Some((index, result)) = completed.next().await {
        on_complete(index, &result);
        slots[index] = Some(result);
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Err(TranslationError::Aborted)))
        .collect()
}

/// In-flight flag for one kind of job
#[derive(Debug, Clone)]
pub struct JobSlot {
    name: &'static str,
    running: Arc<AtomicBool>,
}

impl JobSlot {
    /// Create an idle slot
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Job kind this slot guards
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a job currently holds the slot
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the slot; `None` while another job of this kind is running
    pub fn try_start(&self) -> Option<JobGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| {
                debug!("Job slot '{}' claimed", self.name);
                JobGuard { running: self.running.clone() }
            })
    }
}

/// Releases its job slot when dropped
#[derive(Debug)]
pub struct JobGuard {
    running: Arc<AtomicBool>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
