/*!
 * Bulk translation through the separator escalation ladder
 */

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use sublingo::errors::{ProviderError, TranslationError};
use sublingo::subtitle_processor::SubtitleDocument;
use sublingo::translation::chunking::{PRIMARY_SEPARATOR, SEPARATOR_POOL};
use sublingo::translation::{BulkOptions, BulkTranslator, RetryPolicy};

use crate::common::mock_providers::{MockBulkProvider, MockErrorType};
use crate::common::{self, strings};

fn options() -> BulkOptions {
    BulkOptions {
        target_language: "es".to_string(),
        retry: RetryPolicy::new(1, 1),
        ..BulkOptions::default()
    }
}

fn sample() -> SubtitleDocument {
    SubtitleDocument::parse(common::SAMPLE_SRT).unwrap()
}

fn strip_all_separators(text: &str) -> String {
    let mut out = text.replace(PRIMARY_SEPARATOR.bare, " ");
    for separator in &SEPARATOR_POOL {
        out = out.replace(separator.bare, " ");
    }
    out
}

fn has_any_separator(text: &str) -> bool {
    text.contains(PRIMARY_SEPARATOR.bare) || SEPARATOR_POOL.iter().any(|s| text.contains(s.bare))
}

fn word_count(texts: &[String]) -> usize {
    texts.iter().map(|t| t.split_whitespace().count()).sum()
}

/// A well-behaved provider translates the whole document in one request
#[tokio::test]
async fn test_translate_document_withWorkingProvider_shouldKeepShape() -> Result<()> {
    let translator = BulkTranslator::new(MockBulkProvider::uppercase(), options());
    let source = sample();

    let translated = translator.translate_document(&source, &CancellationToken::new(), |_| {}).await?;

    assert_eq!(translator.provider().call_count(), 1);
    assert_eq!(translated.len(), 3);
    assert_eq!(translated.entries[0].text, "THIS IS A TEST SUBTITLE.");
    assert_eq!(translated.entries[1].text.lines().count(), 2, "two-line entries stay two lines");
    assert_eq!(translated.entries[1].text.replace('\n', " "), "IT CONTAINS MULTIPLE LINES.");
    for (a, b) in source.entries.iter().zip(&translated.entries) {
        assert_eq!((a.start_ms, a.end_ms), (b.start_ms, b.end_ms));
    }
    Ok(())
}

/// An identity provider reproduces the document exactly
#[tokio::test]
async fn test_translate_document_withIdentityProvider_shouldReproduceDocument() -> Result<()> {
    let translator = BulkTranslator::new(MockBulkProvider::identity(), options());
    let source = common::document_from(&["Hello", "world", "today"]);

    let translated = translator.translate_document(&source, &CancellationToken::new(), |_| {}).await?;

    assert_eq!(translator.provider().call_count(), 1);
    assert_eq!(translator.provider().requests(), strings(&["Hello ◌ world ◌ today"]));
    assert_eq!(translated, source);
    Ok(())
}

/// Captions that open with punctuation keep it through an identity round
#[tokio::test]
async fn test_translate_document_withLeadingPunctuation_shouldReproduceDocument() -> Result<()> {
    let translator = BulkTranslator::new(MockBulkProvider::identity(), options());
    let source = common::document_from(&["Wait", "...and then", ", right?", "nothing"]);

    let translated = translator.translate_document(&source, &CancellationToken::new(), |_| {}).await?;

    assert_eq!(translator.provider().call_count(), 1);
    assert_eq!(translated.texts(), strings(&["Wait", "...and then", ", right?", "nothing"]));
    assert_eq!(translated, source);
    Ok(())
}

/// Progress is reported once per chunk and previews the finished entries
#[tokio::test]
async fn test_translate_document_withSmallChunks_shouldReportEveryChunk() -> Result<()> {
    let translator = BulkTranslator::new(
        MockBulkProvider::uppercase(),
        BulkOptions { chunk_max_chars: 30, pool_size: 2, ..options() },
    );

    let mut updates = Vec::new();
    let translated = translator
        .translate_document(&sample(), &CancellationToken::new(), |update| {
            updates.push((update.completed, update.total, update.preview.len()));
        })
        .await?;

    assert_eq!(translator.provider().call_count(), 3);
    assert_eq!(updates.len(), 3);
    assert!(updates.iter().all(|&(_, total, len)| total == 3 && len == 3));
    assert_eq!(updates.last().map(|u| u.0), Some(3));
    assert_eq!(translated.entries[2].text, "FOR TESTING PURPOSES.");
    Ok(())
}

/// Short chunks skip the unchanged-text check, so an echo is accepted
#[tokio::test]
async fn test_translate_texts_withShortEcho_shouldAcceptIt() -> Result<()> {
    let translator = BulkTranslator::new(MockBulkProvider::identity(), options());
    let texts = strings(&["Hola", "", "Adiós"]);

    let translated = translator.translate_texts(&texts, &CancellationToken::new()).await?;

    assert_eq!(translated, texts);
    assert_eq!(translator.provider().call_count(), 1);
    Ok(())
}

/// An echoed long chunk exhausts the separator steps and is retried per line
#[tokio::test]
async fn test_translate_chunk_withUnchangedEcho_shouldFallBackToLines() -> Result<()> {
    let translator = BulkTranslator::new(MockBulkProvider::identity(), options());

    let translated = translator.translate_document(&sample(), &CancellationToken::new(), |_| {}).await?;

    // 3 verbatim and 2 alternate sends, then one per line
    assert_eq!(translator.provider().call_count(), 8);
    let requests = translator.provider().requests();
    assert!(requests[..3].iter().all(|r| r.contains(PRIMARY_SEPARATOR.bare)));
    assert!(requests[5..].iter().all(|r| !has_any_separator(r)));
    assert_eq!(translated.entries[0].text, "This is a test subtitle.");
    Ok(())
}

/// A provider that eats the primary separator is answered by an alternate one
#[tokio::test]
async fn test_translate_chunk_withDroppedPrimarySeparator_shouldUseAlternate() -> Result<()> {
    let translator = BulkTranslator::new(MockBulkProvider::separator_dropping(), options());

    let translated = translator.translate_document(&sample(), &CancellationToken::new(), |_| {}).await?;

    assert_eq!(translator.provider().call_count(), 4);
    assert!(translator.provider().requests()[3].contains(SEPARATOR_POOL[0].bare));
    assert_eq!(translated.entries[2].text, "FOR TESTING PURPOSES.");
    Ok(())
}

/// A provider that eats every separator is handled line by line
#[tokio::test]
async fn test_translate_chunk_withAllSeparatorsDropped_shouldTranslateLines() -> Result<()> {
    let provider = MockBulkProvider::new(|_, text| Ok(strip_all_separators(text).to_uppercase()));
    let translator = BulkTranslator::new(provider, options());

    let translated = translator
        .translate_texts(&strings(&["First line here.", "Second one.", "Third."]), &CancellationToken::new())
        .await?;

    // Short chunk: one verbatim send, two alternates, three lines
    assert_eq!(translator.provider().call_count(), 6);
    assert_eq!(translated, strings(&["FIRST LINE HERE.", "SECOND ONE.", "THIRD."]));
    Ok(())
}

/// When lines fail too, the last mismatched response is redistributed
#[tokio::test]
async fn test_translate_chunk_withFailingLines_shouldRedistributeWords() -> Result<()> {
    let provider = MockBulkProvider::new(|_, text| {
        if has_any_separator(text) {
            Ok(strip_all_separators(text).to_uppercase())
        } else {
            Err(ProviderError::ApiError { status_code: 400, message: "single line rejected".into() })
        }
    });
    let translator = BulkTranslator::new(provider, options());
    let texts = strings(&["one two three four", "five six", "seven eight"]);

    let translated = translator.translate_texts(&texts, &CancellationToken::new()).await?;

    assert_eq!(translated.len(), 3);
    assert_eq!(word_count(&translated), 8);
    assert!(translated.iter().all(|t| t.chars().all(|c| !c.is_lowercase())));
    Ok(())
}

/// Persistent transport failures exhaust the ladder with a summarized error
#[tokio::test]
async fn test_translate_texts_withFailingProvider_shouldReportExhausted() {
    let translator = BulkTranslator::new(
        MockBulkProvider::failing(MockErrorType::Connection),
        BulkOptions { retry: RetryPolicy::new(2, 1), ..options() },
    );

    let result = translator.translate_texts(&strings(&["a", "b"]), &CancellationToken::new()).await;

    assert!(matches!(result, Err(TranslationError::Exhausted { .. })));
    // Three ladder steps and two lines, each tried twice
    assert_eq!(translator.provider().call_count(), 10);
}

/// Authentication failures stop the ladder at once
#[tokio::test]
async fn test_translate_texts_withAuthFailure_shouldStopImmediately() {
    let translator = BulkTranslator::new(MockBulkProvider::failing(MockErrorType::Auth), options());

    let result = translator.translate_texts(&strings(&["a", "b"]), &CancellationToken::new()).await;

    assert!(matches!(result, Err(TranslationError::Provider(ProviderError::AuthenticationError(_)))));
    assert_eq!(translator.provider().call_count(), 1);
}

/// A cancelled run ends in Aborted without contacting the provider
#[tokio::test]
async fn test_translate_document_withCancelledToken_shouldAbort() {
    let translator = BulkTranslator::new(MockBulkProvider::uppercase(), options());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = translator.translate_document(&sample(), &cancel, |_| {}).await;

    assert!(matches!(result, Err(TranslationError::Aborted)));
    assert_eq!(translator.provider().call_count(), 0);
}
