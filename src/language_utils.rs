use anyhow::{Result, anyhow};
use isolang::Language;

use crate::app_config::TranslationEngine;

/// Language utilities for ISO language code handling
///
/// Codes are ISO 639-1 or ISO 639-2 primaries with an optional region
/// subtag (`pt-BR`, `zh_TW`). Engines disagree on which regional forms
/// they accept, so codes are mapped per engine before use.
/// Language code type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageCodeType {
    /// ISO 639-1 (2-letter) code
    Part1,
    /// ISO 639-2/T (3-letter) code
    Part2T,
    /// ISO 639-2/B (3-letter) code
    Part2B,
}

/// ISO 639-2/B codes that differ from their ISO 639-2/T form
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

fn part2b_to_part2t(code: &str) -> Option<&'static str> {
    PART2B_TO_PART2T.iter().find(|(b, _)| *b == code).map(|(_, t)| *t)
}

/// Split a code into its lowercase primary subtag and optional region
pub fn split_region(code: &str) -> (String, Option<String>) {
    let code = code.trim();
    match code.split_once(['-', '_']) {
        Some((primary, region)) => (primary.to_lowercase(), Some(region.to_string())),
        None => (code.to_lowercase(), None),
    }
}

fn is_valid_region(region: &str) -> bool {
    (2..=4).contains(&region.len()) && region.chars().all(|c| c.is_ascii_alphanumeric())
}

fn classify_primary(primary: &str) -> Option<LanguageCodeType> {
    match primary.len() {
        2 => Language::from_639_1(primary).map(|_| LanguageCodeType::Part1),
        3 if Language::from_639_3(primary).is_some() => Some(LanguageCodeType::Part2T),
        3 => part2b_to_part2t(primary).map(|_| LanguageCodeType::Part2B),
        _ => None,
    }
}

/// Validate if a language code is a valid ISO 639-1 or ISO 639-2 code,
/// optionally followed by a region subtag
pub fn validate_language_code(code: &str) -> Result<LanguageCodeType> {
    let (primary, region) = split_region(code);
    if let Some(region) = &region {
        if !is_valid_region(region) {
            return Err(anyhow!("Invalid region subtag in language code: {}", code));
        }
    }
    classify_primary(&primary).ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// Normalize the primary subtag of a code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let (primary, _) = split_region(code);
    match classify_primary(&primary) {
        Some(LanguageCodeType::Part1) => Language::from_639_1(&primary)
            .map(|lang| lang.to_639_3().to_string())
            .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code)),
        Some(LanguageCodeType::Part2T) => Ok(primary),
        Some(LanguageCodeType::Part2B) => part2b_to_part2t(&primary)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code)),
        None => Err(anyhow!("Cannot normalize invalid language code: {}", code)),
    }
}

/// Check if two language codes name the same language, ignoring regions
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;
    Ok(lang.to_name().to_string())
}

/// Language as written into prompts: `Portuguese (BR)` for `pt-BR`.
///
/// Unknown codes are passed through as given.
pub fn prompt_language(code: &str) -> String {
    let Ok(name) = get_language_name(code) else {
        return code.trim().to_string();
    };
    match split_region(code).1 {
        Some(region) => format!("{} ({})", name, region.to_uppercase()),
        None => name,
    }
}

/// Map a target code to the form an engine accepts.
///
/// Gemini reads bare `pt` as ambiguous and gets `pt-BR`; Google only knows
/// plain `pt`. Other codes keep their region with a canonical `xx-YY` shape.
pub fn engine_language_code(code: &str, engine: TranslationEngine) -> String {
    let (primary, region) = split_region(code);
    match (engine, primary.as_str(), region) {
        (TranslationEngine::Gemini, "pt", None) => "pt-BR".to_string(),
        (TranslationEngine::Google, "pt", _) => "pt".to_string(),
        (_, _, Some(region)) => format!("{}-{}", primary, region.to_uppercase()),
        (_, _, None) => primary,
    }
}

/// Split a trailing `_<lang>` suffix off a file stem.
///
/// `video_pt-BR` gives `("video", Some("pt-br"))`; stems whose last segment
/// is not a language code come back whole.
pub fn split_lang_suffix(stem: &str) -> (&str, Option<String>) {
    let Some((base, suffix)) = stem.rsplit_once('_') else {
        return (stem, None);
    };
    if base.is_empty() || validate_language_code(suffix).is_err() {
        return (stem, None);
    }
    (base, Some(suffix.to_lowercase()))
}
