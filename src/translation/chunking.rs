/*!
 * Chunk packing and unpacking for the bulk translation path.
 *
 * Entries are flattened to one line each and joined with a separator token
 * into provider-sized blocks. After translation the block is split back into
 * per-entry text, falling back to proportional word redistribution when the
 * provider merged or dropped separators.
 */

use std::ops::Range;

/// Reserved placeholder for empty entries so the provider never drops the slot
pub const EMPTY_PLACEHOLDER: char = '\u{3164}';

/// Default chunk budget in characters
pub const DEFAULT_CHUNK_MAX_CHARS: usize = 5_000;

/// Segment endings that make a good chunk boundary
pub const SENTENCE_ENDINGS: [char; 15] = [
    '.', '!', '?', ')', 'よ', 'ね', 'の', 'さ', 'ぞ', 'な', 'か', '！', '。', '」', '…',
];

/// Leading punctuation providers tend to push past a separator
const STRAY_LEADING: &[char] = &[' ', ',', '.', ':', ';', ')'];

/// Separator token placed between entries of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separator {
    /// Form inserted between segments
    pub padded: &'static str,
    /// Glyph searched for in the translated text
    pub bare: &'static str,
}

impl Separator {
    /// Number of separator glyphs in a text
    pub fn count_in(&self, text: &str) -> usize {
        text.matches(self.bare).count()
    }

    /// Remove every separator glyph, leaving single spaces
    pub fn strip_from(&self, text: &str) -> String {
        text.replace(self.bare, " ").split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Primary separator
pub const PRIMARY_SEPARATOR: Separator = Separator { padded: " ◌ ", bare: "◌" };

/// Alternates tried when a provider keeps stripping the primary token
pub const SEPARATOR_POOL: [Separator; 4] = [
    Separator { padded: " ◊ ", bare: "◊" },
    Separator { padded: " ※ ", bare: "※" },
    Separator { padded: " ¶ ", bare: "¶" },
    Separator { padded: " ⁂ ", bare: "⁂" },
];

/// A contiguous run of entries packed for one provider request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the first entry in the document
    pub start: usize,
    /// Flattened entry texts
    pub segments: Vec<String>,
}

impl Chunk {
    /// Entry positions covered by this chunk
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.segments.len()
    }

    /// Number of entries in the chunk
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the chunk has no entries
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Text sent to the provider
    pub fn render(&self, separator: &Separator) -> String {
        self.segments.join(separator.padded)
    }
}

/// Flatten internal line breaks; empty text becomes the placeholder
pub fn flatten_entry_text(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        flat
    }
}

fn ends_sentence(segment: &str) -> bool {
    segment.chars().last().is_some_and(|c| SENTENCE_ENDINGS.contains(&c))
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Cut an oversized segment at a word boundary and mark the cut with an ellipsis
fn truncate_segment(segment: &str, max_chars: usize) -> String {
    let keep = max_chars.saturating_sub(1);
    let head: String = segment.chars().take(keep).collect();
    let cut = match head.rfind(' ') {
        Some(pos) if pos > 0 => head[..pos].trim_end().to_string(),
        _ => head,
    };
    format!("{}\u{2026}", cut)
}

/// Group entry texts into chunks that stay within `max_chars` once rendered.
///
/// A chunk that would overflow is cut after its last sentence-ending segment
/// and the tail moves on to the next chunk.
pub fn pack_chunks(texts: &[String], max_chars: usize, separator: &Separator) -> Vec<Chunk> {
    let max_chars = max_chars.max(2);
    let sep_len = char_len(separator.padded);

    let mut chunks = Vec::new();
    let mut current = Chunk { start: 0, segments: Vec::new() };
    let mut current_len = 0usize;

    let rendered_len = |segments: &[String]| -> usize {
        segments.iter().map(|s| char_len(s)).sum::<usize>() + segments.len().saturating_sub(1) * sep_len
    };

    for (i, text) in texts.iter().enumerate() {
        let segment = flatten_entry_text(text);
        let seg_len = char_len(&segment);

        if seg_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::replace(&mut current, Chunk { start: i, segments: Vec::new() }));
            }
            chunks.push(Chunk { start: i, segments: vec![truncate_segment(&segment, max_chars)] });
            current = Chunk { start: i + 1, segments: Vec::new() };
            current_len = 0;
            continue;
        }

        if !current.is_empty() && current_len + sep_len + seg_len > max_chars {
            let boundary = current.segments[..current.len() - 1]
                .iter()
                .rposition(|s| ends_sentence(s));

            let carry = match boundary {
                Some(k) => current.segments.split_off(k + 1),
                None => Vec::new(),
            };
            let carry_start = current.start + current.len();
            chunks.push(std::mem::replace(&mut current, Chunk { start: carry_start, segments: carry }));
            current_len = rendered_len(&current.segments);

            if !current.is_empty() && current_len + sep_len + seg_len > max_chars {
                chunks.push(std::mem::replace(&mut current, Chunk { start: i, segments: Vec::new() }));
                current_len = 0;
            }
        }

        if current.is_empty() {
            current.start = i;
            current_len = seg_len;
        } else {
            current_len += sep_len + seg_len;
        }
        current.segments.push(segment);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Tidy spacing around the separator, split and drop blanks
fn split_translated(translated: &str, separator: &Separator) -> Vec<String> {
    let bare = separator.bare;
    let tidied = translated
        .replace(&format!("{} ", bare), bare)
        .replace(&format!(" {}", bare), bare);

    tidied
        .split(bare)
        .map(|piece| piece.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn is_placeholder(text: &str) -> bool {
    text.chars().all(|c| c == EMPTY_PLACEHOLDER)
}

fn restore_placeholder(text: String) -> String {
    if text.trim_matches(EMPTY_PLACEHOLDER).trim().is_empty() {
        String::new()
    } else {
        text
    }
}

/// Split a translated chunk back into one text per source segment.
///
/// The result always has exactly `segments.len()` items.
pub fn unpack_chunk(segments: &[String], translated: &str, separator: &Separator) -> Vec<String> {
    let pieces = split_translated(translated, separator);

    if pieces.len() == segments.len() {
        let mut out: Vec<String> = Vec::with_capacity(segments.len());
        for (piece, source) in pieces.into_iter().zip(segments) {
            // Leading punctuation is only stray when the source didn't have it
            if source.starts_with(STRAY_LEADING) {
                out.push(piece);
                continue;
            }
            let cleaned = piece.trim_start_matches(STRAY_LEADING).to_string();
            if cleaned.is_empty() {
                out.push(piece);
                continue;
            }
            let moved = &piece[..piece.len() - piece.trim_start_matches(['.', ',']).len()];
            if let Some(prev) = out.last_mut() {
                if !moved.is_empty() && !is_placeholder(prev) && !prev.ends_with(moved) {
                    prev.push_str(moved);
                }
            }
            out.push(cleaned);
        }
        return out.into_iter().map(restore_placeholder).collect();
    }

    let words: Vec<String> = pieces
        .iter()
        .flat_map(|p| p.split_whitespace())
        .filter(|w| !is_placeholder(w))
        .map(str::to_string)
        .collect();

    redistribute_words(segments, &words)
        .into_iter()
        .map(restore_placeholder)
        .collect()
}

fn word_count(segment: &str) -> usize {
    segment
        .split_whitespace()
        .filter(|w| !is_placeholder(w))
        .count()
}

/// Assign each segment a contiguous span of `words` proportional to its share
/// of the source word count. The last segment absorbs leftovers, so every
/// word appears exactly once across the output.
pub fn redistribute_words(segments: &[String], words: &[String]) -> Vec<String> {
    if segments.is_empty() {
        return Vec::new();
    }

    let source_total: usize = segments.iter().map(|s| word_count(s)).sum();
    if words.is_empty() {
        return segments.to_vec();
    }
    if source_total == 0 {
        let mut out = vec![String::new(); segments.len()];
        if let Some(last) = out.last_mut() {
            *last = words.join(" ");
        }
        return out;
    }

    let ratio = words.len() as f64 / source_total as f64;
    let mut cursor = 0usize;
    let last = segments.len() - 1;

    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let span = if i == last {
                words.len() - cursor
            } else {
                let wanted = (word_count(segment) as f64 * ratio).round() as usize;
                wanted.min(words.len() - cursor)
            };
            let text = words[cursor..cursor + span].join(" ");
            cursor += span;
            text
        })
        .collect()
}

/// Re-wrap text so it renders on exactly `lines` lines when it has enough words.
///
/// Text that already has the right line count is kept. Otherwise words are
/// spread evenly with the last line taking the remainder; with fewer words
/// than lines each word gets its own line.
pub fn fit_line_count(text: &str, lines: usize) -> String {
    let lines = lines.max(1);
    let current: Vec<&str> = text
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if current.len() == lines {
        return current.join("\n");
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if lines == 1 || words.len() <= 1 {
        return words.join(" ");
    }
    if words.len() <= lines {
        return words.join("\n");
    }

    let per_line = words.len() / lines;
    let mut out = Vec::with_capacity(lines);
    for i in 0..lines {
        let from = i * per_line;
        let to = if i == lines - 1 { words.len() } else { from + per_line };
        out.push(words[from..to].join(" "));
    }
    out.join("\n")
}
