/*!
 * Tests for chunk packing and unpacking over generated inputs
 */

use sublingo::translation::chunking::{
    EMPTY_PLACEHOLDER, PRIMARY_SEPARATOR, SEPARATOR_POOL, fit_line_count, pack_chunks, redistribute_words,
    unpack_chunk,
};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::strings;

const WORDS: &[&str] = &["hello", "world", "this", "is", "a", "test", "of", "the", "chunker", "again"];
const ENDINGS: &[&str] = &["", "", ".", "?", "!", ","];

fn corpus(seed: u64, count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.random_range(0..12);
            let mut words: Vec<&str> = (0..len).map(|_| WORDS[rng.random_range(0..WORDS.len())]).collect();
            if len > 4 && rng.random_bool(1.0 / 3.0) {
                words.insert(len / 2, "\n");
            }
            let mut text = words.join(" ");
            if !text.is_empty() {
                text.push_str(ENDINGS[rng.random_range(0..ENDINGS.len())]);
            }
            text
        })
        .collect()
}

/// Rendered chunks stay within budget and cover every entry once, in order
#[test]
fn test_pack_chunks_withGeneratedCorpus_shouldRespectBudgetAndCoverage() {
    for seed in 1..20u64 {
        let texts = corpus(seed, 60);
        for max_chars in [40usize, 120, 500] {
            let chunks = pack_chunks(&texts, max_chars, &PRIMARY_SEPARATOR);

            let mut next = 0;
            for chunk in &chunks {
                assert!(!chunk.is_empty());
                assert_eq!(chunk.start, next, "chunks must be contiguous");
                next = chunk.range().end;
                assert!(
                    chunk.render(&PRIMARY_SEPARATOR).chars().count() <= max_chars,
                    "seed {} budget {}: chunk over budget",
                    seed,
                    max_chars
                );
            }
            assert_eq!(next, texts.len());
        }
    }
}

/// An identity translation unpacks to the flattened source
#[test]
fn test_unpack_chunk_withIdentityTranslation_shouldReturnSource() {
    let texts = corpus(7, 40);
    for chunk in pack_chunks(&texts, 200, &PRIMARY_SEPARATOR) {
        let rendered = chunk.render(&PRIMARY_SEPARATOR);
        let unpacked = unpack_chunk(&chunk.segments, &rendered, &PRIMARY_SEPARATOR);
        let expected: Vec<String> = chunk.range()
            .map(|i| texts[i].split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();
        assert_eq!(unpacked, expected);
    }
}

/// Whatever the provider drops, the output has one text per segment and
/// no translated word is lost or duplicated
#[test]
fn test_unpack_chunk_withDroppedSeparators_shouldKeepSegmentCountAndWords() {
    let mut rng = StdRng::seed_from_u64(99);
    let texts = corpus(3, 80);

    for chunk in pack_chunks(&texts, 150, &PRIMARY_SEPARATOR) {
        let rendered = chunk.render(&PRIMARY_SEPARATOR).to_uppercase();
        let mut damaged = String::new();
        for piece in rendered.split(PRIMARY_SEPARATOR.bare) {
            if !damaged.is_empty() {
                damaged.push_str(if rng.random_bool(0.5) { PRIMARY_SEPARATOR.bare } else { " " });
            }
            damaged.push_str(piece);
        }

        let unpacked = unpack_chunk(&chunk.segments, &damaged, &PRIMARY_SEPARATOR);
        assert_eq!(unpacked.len(), chunk.len());

        let words_out: Vec<&str> = unpacked.iter().flat_map(|t| t.split_whitespace()).collect();
        let words_in: Vec<&str> = damaged
            .split(PRIMARY_SEPARATOR.bare)
            .flat_map(|t| t.split_whitespace())
            .filter(|w| !w.chars().all(|c| c == EMPTY_PLACEHOLDER))
            .collect();
        assert_eq!(words_out.len(), words_in.len());
    }
}

/// Alternate separators work the same way as the primary one
#[test]
fn test_unpack_chunk_withAlternateSeparator_shouldSplitOnIt() {
    let texts = strings(&["One line", "", "Third line"]);
    for separator in &SEPARATOR_POOL {
        let chunks = pack_chunks(&texts, 500, separator);
        assert_eq!(chunks.len(), 1);
        let rendered = chunks[0].render(separator).to_uppercase();
        assert_eq!(
            unpack_chunk(&chunks[0].segments, &rendered, separator),
            strings(&["ONE LINE", "", "THIRD LINE"])
        );
    }
}

/// Redistribution follows the source word shares
#[test]
fn test_redistribute_words_withProportionalShares_shouldFollowSource() {
    let segments = strings(&["a b c d", "e f"]);
    let words = strings(&["1", "2", "3", "4", "5", "6", "7", "8", "9"]);
    // 6 source words, 9 translated: 4 * 1.5 = 6, the last gets the remaining 3
    assert_eq!(redistribute_words(&segments, &words), strings(&["1 2 3 4 5 6", "7 8 9"]));
}

/// A two-line entry comes back on two lines after translation
#[test]
fn test_fit_line_count_withTwoLineSource_shouldEnforceTwoLines() {
    let fitted = fit_line_count("uno dos tres cuatro cinco", 2);
    assert_eq!(fitted.lines().count(), 2);
    assert_eq!(fitted, "uno dos\ntres cuatro cinco");
    assert_eq!(fit_line_count("already\nsplit", 2), "already\nsplit");
    assert_eq!(fit_line_count("merge\nthese", 1), "merge these");
}
