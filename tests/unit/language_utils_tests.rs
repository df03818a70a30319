/*!
 * Tests for language code utilities
 */

use anyhow::Result;
use sublingo::app_config::TranslationEngine;
use sublingo::language_utils::{
    LanguageCodeType, engine_language_code, get_language_name, language_codes_match, normalize_to_part2t,
    split_region, validate_language_code,
};

/// Test validation of the supported code forms
#[test]
fn test_validate_language_code_withValidCodes_shouldClassify() -> Result<()> {
    assert_eq!(validate_language_code("en")?, LanguageCodeType::Part1);
    assert_eq!(validate_language_code("fra")?, LanguageCodeType::Part2T);
    assert_eq!(validate_language_code("ger")?, LanguageCodeType::Part2B);
    assert_eq!(validate_language_code("pt-BR")?, LanguageCodeType::Part1);
    assert_eq!(validate_language_code("zh_Hant")?, LanguageCodeType::Part1);
    Ok(())
}

/// Test rejection of malformed codes and regions
#[test]
fn test_validate_language_code_withInvalidCodes_shouldFail() {
    assert!(validate_language_code("").is_err());
    assert!(validate_language_code("xx").is_err());
    assert!(validate_language_code("english").is_err());
    assert!(validate_language_code("pt-").is_err());
    assert!(validate_language_code("pt-Brazil").is_err());
}

/// Regions are split on either separator and the primary is lowercased
#[test]
fn test_split_region_withMixedCase_shouldLowercasePrimary() {
    assert_eq!(split_region(" PT-br "), ("pt".to_string(), Some("br".to_string())));
    assert_eq!(split_region("zh_TW"), ("zh".to_string(), Some("TW".to_string())));
    assert_eq!(split_region("de"), ("de".to_string(), None));
}

/// All three code forms normalize to the same 3-letter code
#[test]
fn test_normalize_to_part2t_withEquivalentCodes_shouldAgree() -> Result<()> {
    assert_eq!(normalize_to_part2t("de")?, "deu");
    assert_eq!(normalize_to_part2t("deu")?, "deu");
    assert_eq!(normalize_to_part2t("ger")?, "deu");
    assert_eq!(normalize_to_part2t("fr-CA")?, "fra");
    Ok(())
}

/// Matching ignores code form and region
#[test]
fn test_language_codes_match_withRegionalVariants_shouldMatch() {
    assert!(language_codes_match("en", "eng"));
    assert!(language_codes_match("pt-BR", "pt"));
    assert!(!language_codes_match("en", "fr"));
    assert!(!language_codes_match("en", "not-a-code"));
}

/// Names come from the ISO tables
#[test]
fn test_get_language_name_withKnownCodes_shouldReturnEnglishName() -> Result<()> {
    assert_eq!(get_language_name("es")?, "Spanish");
    assert_eq!(get_language_name("fre")?, "French");
    assert!(get_language_name("qqq").is_err());
    Ok(())
}

/// Non-Portuguese regional codes keep an uppercase region for both engines
#[test]
fn test_engine_language_code_withRegionalCode_shouldUppercaseRegion() {
    for engine in [TranslationEngine::Google, TranslationEngine::Gemini] {
        assert_eq!(engine_language_code("es-mx", engine), "es-MX");
        assert_eq!(engine_language_code("fr", engine), "fr");
    }
}
