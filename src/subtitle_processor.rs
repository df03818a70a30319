use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use regex::Regex;
use once_cell::sync::Lazy;
use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::errors::SubtitleError;

// @module: Subtitle document model, SRT codec and timing normalization

// @const: SRT timestamp regex (comma or dot before the milliseconds)
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3}):(\d{2}):(\d{2})[,.](\d{1,3})$").unwrap()
});

// @const: Blank-line block boundary
static BLOCK_SPLIT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n[ \t]*\n").unwrap()
});

/// Value returned for timestamps that cannot be parsed.
///
/// Large enough to sort after any real timestamp, small enough that adding
/// the 1 ms normalization step never overflows.
pub const MALFORMED_TIMESTAMP_MS: u64 = u64::MAX / 2;

/// Parse an `HH:MM:SS,mmm` timestamp to absolute milliseconds.
///
/// Malformed input never fails; it maps to [`MALFORMED_TIMESTAMP_MS`].
pub fn parse_timestamp(timestamp: &str) -> u64 {
    let Some(caps) = TIMESTAMP_REGEX.captures(timestamp.trim()) else {
        return MALFORMED_TIMESTAMP_MS;
    };

    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    match (field(1), field(2), field(3), field(4)) {
        (Some(hours), Some(minutes), Some(seconds), Some(millis)) if minutes < 60 && seconds < 60 => {
            hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis
        }
        _ => MALFORMED_TIMESTAMP_MS,
    }
}

/// Format milliseconds as an SRT timestamp (HH:MM:SS,mmm)
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    // @field: 1-based position after normalization
    pub index: usize,

    // @field: Start time in ms
    pub start_ms: u64,

    // @field: End time in ms
    pub end_ms: u64,

    // @field: Caption text, may contain line breaks
    pub text: String,
}

impl SubtitleEntry {
    /// Creates a new subtitle entry
    pub fn new(index: usize, start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        SubtitleEntry {
            index,
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    /// Number of rendered lines; an empty caption still occupies one slot
    pub fn line_count(&self) -> usize {
        self.text.trim().lines().count().max(1)
    }

    /// Convert start time to formatted SRT timestamp
    pub fn format_start_time(&self) -> String {
        format_timestamp(self.start_ms)
    }

    /// Convert end time to formatted SRT timestamp
    pub fn format_end_time(&self) -> String {
        format_timestamp(self.end_ms)
    }

    /// Parse one blank-line separated block; `None` when it has no time-range line
    fn parse_block(block: &str) -> Option<Self> {
        let mut lines = block.lines().map(str::trim_end).skip_while(|l| l.trim().is_empty()).peekable();

        let mut index = 0;
        if let Some(first) = lines.peek() {
            if !first.contains("-->") {
                index = first.trim().parse::<usize>().ok()?;
                lines.next();
            }
        }

        let timing = lines.next()?;
        let (start, end) = timing.split_once("-->")?;
        // Position hints (e.g. "X1:40") may trail the end timestamp
        let end = end.split_whitespace().next().unwrap_or_default();

        let text = lines.collect::<Vec<_>>().join("\n");

        Some(SubtitleEntry {
            index,
            start_ms: parse_timestamp(start),
            end_ms: parse_timestamp(end),
            text: text.trim().to_string(),
        })
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.index)?;
        writeln!(f, "{} --> {}", self.format_start_time(), self.format_end_time())?;
        // A blank line inside the text would end the block on re-read
        let text = self
            .text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        write!(f, "{}", text.trim())
    }
}

/// Ordered sequence of subtitle entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleDocument {
    /// Entries in chronological order
    pub entries: Vec<SubtitleEntry>,
}

impl SubtitleDocument {
    /// Create a document from entries and normalize its timing
    pub fn new(entries: Vec<SubtitleEntry>) -> Self {
        let mut document = Self { entries };
        document.normalize();
        document
    }

    /// Parse SRT content into a normalized document
    pub fn parse(content: &str) -> Result<Self, SubtitleError> {
        let content = content.replace("\r\n", "\n").replace('\r', "\n");
        let content = content.trim_start_matches('\u{feff}');

        if content.trim().is_empty() {
            return Err(SubtitleError::Format("subtitle content is empty".to_string()));
        }

        let mut entries = Vec::new();
        let mut skipped = 0;
        for block in BLOCK_SPLIT_REGEX.split(content.trim()) {
            match SubtitleEntry::parse_block(block) {
                Some(entry) => entries.push(entry),
                None => {
                    skipped += 1;
                    debug!("Skipping block without time range: {:?}", block.lines().next().unwrap_or_default());
                }
            }
        }

        if entries.is_empty() {
            return Err(SubtitleError::Format("no valid subtitle blocks were found".to_string()));
        }

        if skipped > 0 {
            warn!("Skipped {} malformed subtitle block(s)", skipped);
        }

        Ok(Self::new(entries))
    }

    /// Read and parse an SRT file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SubtitleError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Serialize to SRT
    pub fn to_srt(&self) -> String {
        let mut output = self.to_string();
        output.push('\n');
        output
    }

    /// Write the document atomically; the previous file stays intact on failure
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SubtitleError> {
        write_atomically(path.as_ref(), &self.to_srt())
    }

    /// Clamp timings so entries are ordered, non-empty and non-overlapping,
    /// then renumber from 1. Running it twice changes nothing.
    pub fn normalize(&mut self) {
        let mut previous_end = 0u64;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.start_ms < previous_end {
                entry.start_ms = previous_end;
            }
            if entry.end_ms <= entry.start_ms {
                entry.end_ms = entry.start_ms + 1;
            }
            entry.index = i + 1;
            previous_end = entry.end_ms;
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the document has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry texts in order
    pub fn texts(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.text.clone()).collect()
    }

    /// Build the parallel document carrying the same timings with new texts.
    ///
    /// Missing texts keep the source text.
    pub fn with_texts(&self, texts: &[String]) -> Self {
        let entries = self.entries.iter()
            .enumerate()
            .map(|(i, entry)| SubtitleEntry {
                text: texts.get(i).cloned().unwrap_or_else(|| entry.text.clone()),
                ..entry.clone()
            })
            .collect();
        Self { entries }
    }

    /// End of the final entry, used as the media duration estimate
    pub fn duration_ms(&self) -> u64 {
        self.entries.last()
            .map(|e| e.end_ms)
            .filter(|ms| *ms < MALFORMED_TIMESTAMP_MS)
            .unwrap_or(0)
    }

    /// All captions on a single line, without timestamps
    pub fn plain_text(&self) -> String {
        self.entries.iter()
            .map(|e| e.text.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for SubtitleDocument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "\n\n")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Write through a temporary file in the destination directory, then rename
pub fn write_atomically(path: &Path, content: &str) -> Result<(), SubtitleError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    fs::create_dir_all(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent)?;
    temp.write_all(content.as_bytes())?;
    temp.flush()?;
    temp.persist(path).map_err(|e| SubtitleError::Io(e.error))?;
    Ok(())
}
