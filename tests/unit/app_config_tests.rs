/*!
 * Tests for app configuration functionality
 */

use anyhow::Result;
use std::fs;
use std::str::FromStr;

use crate::common;
use sublingo::app_config::{Config, LogLevel, TranslationEngine};

fn config_with_keys(keys: &[&str]) -> Config {
    let mut config = Config::default();
    config.add_api_keys(keys.iter().copied());
    config
}

/// Test default configuration values
#[test]
fn test_default_config_shouldHaveExpectedValues() {
    let config = Config::default();
    assert_eq!(config.target_language, "en");
    assert_eq!(config.engine, None);
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.bulk.verbatim_attempts, 3);
    assert_eq!(config.bulk.alternate_attempts, 2);
    assert_eq!(config.bulk.unchanged_min_chars, 40);
    assert_eq!(config.gemini.model, "gemini-2.5-flash");
    assert_eq!(config.summary.max_rounds, 5);
    assert_eq!(config.retry.max_attempts, 3);
    assert!(config.validate().is_ok());
}

/// A missing file is created with the defaults, then read back
#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let (created, was_created) = Config::load_or_create(&path)?;
    assert!(was_created);
    assert!(path.exists());

    let (loaded, was_created) = Config::load_or_create(&path)?;
    assert!(!was_created);
    assert_eq!(loaded.target_language, created.target_language);
    assert_eq!(loaded.gemini.max_output_tokens, created.gemini.max_output_tokens);
    Ok(())
}

/// Missing sections fall back to their defaults
#[test]
fn test_load_or_create_withPartialFile_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{"target_language": "fr", "engine": "gemini", "gemini": {"api_keys": ["k1, k2"]}, "log_level": "debug"}"#,
    )?;

    let (config, was_created) = Config::load_or_create(&path)?;
    assert!(!was_created);
    assert_eq!(config.target_language, "fr");
    assert_eq!(config.engine, Some(TranslationEngine::Gemini));
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.api_keys(), vec!["k1".to_string(), "k2".to_string()]);
    assert_eq!(config.bulk.pool_size, Config::default().bulk.pool_size);
    Ok(())
}

/// Malformed JSON is reported instead of being replaced
#[test]
fn test_load_or_create_withInvalidJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "conf.json", "{ not json")?;

    assert!(Config::load_or_create(&path).is_err());
    assert_eq!(fs::read_to_string(&path)?, "{ not json");
    Ok(())
}

/// Keys select Gemini unless an engine is chosen explicitly
#[test]
fn test_effective_engine_withAndWithoutKeys_shouldAutoSelect() {
    assert_eq!(Config::default().effective_engine(), TranslationEngine::Google);

    let mut config = config_with_keys(&["secret"]);
    assert_eq!(config.effective_engine(), TranslationEngine::Gemini);

    config.engine = Some(TranslationEngine::Google);
    assert_eq!(config.effective_engine(), TranslationEngine::Google);
}

/// Duplicate and blank keys are dropped when added
#[test]
fn test_add_api_keys_withDuplicates_shouldNormalize() {
    let mut config = config_with_keys(&["a", " b ", ""]);
    config.add_api_keys(["a", "c"]);
    assert_eq!(config.api_keys(), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
}

/// Invalid values are rejected by validation
#[test]
fn test_validate_withInvalidValues_shouldFail() {
    let mut config = Config::default();
    config.target_language = "klingon".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.engine = Some(TranslationEngine::Gemini);
    assert!(config.validate().is_err(), "Gemini without keys");

    let mut config = Config::default();
    config.bulk.chunk_max_chars = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.gemini.batch_max_items = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.bulk.pool_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.bulk.unchanged_prefix_ratio = 1.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.summary.language = "zz-!".to_string();
    assert!(config.validate().is_err());
}

/// Summaries need a key even when translation does not
#[test]
fn test_validate_summary_withoutKeys_shouldFail() {
    assert!(Config::default().validate_summary().is_err());
    assert!(config_with_keys(&["k"]).validate_summary().is_ok());
}

/// Each engine gets the target in the form it understands
#[test]
fn test_options_withPortugueseTarget_shouldMapPerEngine() {
    let mut config = config_with_keys(&["k"]);
    config.target_language = "pt".to_string();

    assert_eq!(config.bulk_options().target_language, "pt");
    assert_eq!(config.batch_options().target_language, "Portuguese (BR)");
    assert_eq!(config.summary_options(None).language, "");
    assert_eq!(config.summary_options(Some("de")).language, "German");

    config.retry.max_attempts = 7;
    assert_eq!(config.bulk_options().retry.max_attempts, 7);
    assert_eq!(config.batch_options().retry.max_attempts, 7);
}

/// The public endpoint is used unless one is configured
#[test]
fn test_bulk_endpoint_withOverride_shouldUseIt() {
    let mut config = Config::default();
    assert!(config.bulk_endpoint().starts_with("https://"));
    config.bulk.endpoint = "http://localhost:8080/translate".to_string();
    assert_eq!(config.bulk_endpoint(), "http://localhost:8080/translate");
}

/// Engine names parse and print in lowercase
#[test]
fn test_translation_engine_withNames_shouldRoundTrip() -> Result<()> {
    assert_eq!(TranslationEngine::from_str("Gemini")?, TranslationEngine::Gemini);
    assert_eq!(TranslationEngine::Google.to_string(), "google");
    assert_eq!(TranslationEngine::Google.display_name(), "Google Translate");
    assert!(TranslationEngine::from_str("deepl").is_err());
    Ok(())
}
