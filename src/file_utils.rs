use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::language_utils::{language_codes_match, split_lang_suffix, split_region};
use crate::subtitle_processor::write_atomically;

// @module: File and directory utilities

static SRT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+\s*\r?\n\d{1,3}:\d{2}:\d{2}[,.]\d{1,3}\s+-->\s+\d{1,3}:\d{2}:\d{2}[,.]\d{1,3}").unwrap()
});

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @checks: Non-empty file existence
    pub fn file_is_valid<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(path.as_ref()).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    // @returns: Lowercase file-name form of a language code
    pub fn suffix_for(language: &str) -> String {
        let (primary, region) = split_region(language);
        match region {
            Some(region) => format!("{}-{}", primary, region.to_lowercase()),
            None => primary,
        }
    }

    // @returns: File stem with any trailing language suffix removed
    pub fn base_stem<P: AsRef<Path>>(input_file: P) -> String {
        let stem = input_file.as_ref().file_stem().unwrap_or_default().to_string_lossy().to_string();
        split_lang_suffix(&stem).0.to_string()
    }

    // @returns: Language named by the file's `_<lang>` suffix
    pub fn language_from_name<P: AsRef<Path>>(input_file: P) -> Option<String> {
        let stem = input_file.as_ref().file_stem()?.to_string_lossy().to_string();
        split_lang_suffix(&stem).1
    }

    // @returns: Directory that receives outputs for an input file.
    // @params: input_root is the directory the run started from, if any
    fn output_dir_for(input_file: &Path, input_root: Option<&Path>, output_dir: Option<&Path>) -> PathBuf {
        let source_dir = input_file.parent().map(Path::to_path_buf).unwrap_or_default();
        let Some(output_dir) = output_dir else {
            return source_dir;
        };
        let relative = input_root
            .and_then(|root| source_dir.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        output_dir.join(relative)
    }

    // @generates: `<stem>_<lang>.srt` for a translated subtitle
    pub fn translated_path<P: AsRef<Path>>(
        input_file: P,
        input_root: Option<&Path>,
        output_dir: Option<&Path>,
        target_language: &str,
    ) -> PathBuf {
        let input_file = input_file.as_ref();
        let name = format!("{}_{}.srt", Self::base_stem(input_file), Self::suffix_for(target_language));
        Self::output_dir_for(input_file, input_root, output_dir).join(name)
    }

    // @generates: `<stem>_tltw_<lang>.md` for a summary
    pub fn summary_path<P: AsRef<Path>>(
        input_file: P,
        input_root: Option<&Path>,
        output_dir: Option<&Path>,
        language: &str,
    ) -> PathBuf {
        let input_file = input_file.as_ref();
        let name = format!("{}_tltw_{}.md", Self::base_stem(input_file), Self::suffix_for(language));
        Self::output_dir_for(input_file, input_root, output_dir).join(name)
    }

    // @generates: Plain-text export path next to a subtitle file
    pub fn text_path<P: AsRef<Path>>(subtitle_file: P) -> PathBuf {
        subtitle_file.as_ref().with_extension("txt")
    }

    /// Find subtitle files under a directory, skipping ones that already
    /// carry the target language suffix
    pub fn find_subtitle_files<P: AsRef<Path>>(dir: P, skip_language: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true).sort_by_file_name() {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if !path.is_file() || !Self::has_srt_extension(path) {
                continue;
            }

            if let (Some(skip), Some(own)) = (skip_language, Self::language_from_name(path)) {
                if Self::same_suffix(skip, &own) {
                    log::debug!("Skipping {:?}: already in the target language", path);
                    continue;
                }
            }

            result.push(path.to_path_buf());
        }

        Ok(result)
    }

    // @checks: `en` matches `en` and `eng`; regional suffixes must match exactly
    pub fn same_suffix(language: &str, suffix: &str) -> bool {
        let wanted = Self::suffix_for(language);
        if wanted == suffix {
            return true;
        }
        !wanted.contains('-') && !suffix.contains('-') && language_codes_match(&wanted, suffix)
    }

    fn has_srt_extension(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("srt"))
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path).with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a string to a file through a temporary sibling, creating parents
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            Self::ensure_dir(parent)?;
        }

        write_atomically(path, content).with_context(|| format!("Failed to write to file: {:?}", path))
    }

    /// Detect if a file is a subtitle file (SRT)
    pub fn detect_file_type<P: AsRef<Path>>(path: P) -> Result<FileType> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow!("File does not exist: {:?}", path));
        }
        if path.is_dir() {
            return Ok(FileType::Directory);
        }
        if Self::has_srt_extension(path) {
            return Ok(FileType::Subtitle);
        }

        // Fall back to examining file contents
        if let Ok(content) = fs::read_to_string(path) {
            if content.contains("-->") && SRT_PATTERN.is_match(&content) {
                return Ok(FileType::Subtitle);
            }
        }

        Ok(FileType::Unknown)
    }
}

/// Enum representing different input kinds
#[derive(Debug, PartialEq, Eq)]
pub enum FileType {
    /// Subtitle file (SRT)
    Subtitle,
    /// Directory to search recursively
    Directory,
    /// Unknown file type
    Unknown,
}
