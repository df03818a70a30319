/*!
 * Common test utilities for the sublingo test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use sublingo::subtitle_processor::{SubtitleDocument, SubtitleEntry};

// Re-export the mock providers module
pub mod mock_providers;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Three-entry SRT used across tests
pub const SAMPLE_SRT: &str = "1
00:00:01,000 --> 00:00:04,000
This is a test subtitle.

2
00:00:05,000 --> 00:00:09,000
It contains
multiple lines.

3
00:00:10,000 --> 00:00:14,000
For testing purposes.
";

/// Creates a sample subtitle file for testing
pub fn create_test_subtitle(dir: &Path, filename: &str) -> Result<PathBuf> {
    create_test_file(dir, filename, SAMPLE_SRT)
}

/// Document with one entry per text, two seconds apart
pub fn document_from(texts: &[&str]) -> SubtitleDocument {
    SubtitleDocument::new(
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let start = i as u64 * 2_000;
                SubtitleEntry::new(i + 1, start, start + 1_500, *text)
            })
            .collect(),
    )
}

/// Owned strings from literals
pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
