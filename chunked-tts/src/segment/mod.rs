//! Text segmentation
//!
//! Splits a long text into ordered chunks that a synthesis backend can accept
//! in one call. Boundaries are chosen lexically (punctuation and whitespace);
//! lengths are measured in characters, not bytes.

mod sentence;
mod window;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentence terminators, including CJK full-width forms
const TERMINATORS: &[char] = &['.', '!', '?', '…', '。', '！', '？'];

/// Comma-class separators
const CLAUSE_BREAKS: &[char] = &[',', ';', ':', '，', '、', '；', '：'];

/// Characters removed from the end of a chunk before it is spoken
const TRAILING_PUNCTUATION: &[char] = &[
    '.', '!', '?', ',', ';', ':', '…', '。', '！', '？', '，', '；', '：',
];

/// A bounded, contiguous slice of the input text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 1-based position in the job, dense
    pub index: usize,
    pub text: String,
    /// Character count of `text`
    pub original_length: usize,
}

/// Boundary policy used to cut the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentMode {
    /// Windows of at most `max_chars`, cut in the last fifth of the window
    #[default]
    Fixed,
    /// Tail search over the last 100 characters, for backends with small caps
    Smart,
    /// Whole-window punctuation search that may overshoot up to 2x `max_chars`
    Punctuation,
    /// Newlines and sentence terminators end a piece; pieces are packed
    Sentence,
    /// Only newlines end a piece; pieces are packed
    Paragraph,
}

impl SegmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentMode::Fixed => "fixed",
            SegmentMode::Smart => "smart",
            SegmentMode::Punctuation => "punctuation",
            SegmentMode::Sentence => "sentence",
            SegmentMode::Paragraph => "paragraph",
        }
    }

    pub const ALL: [SegmentMode; 5] = [
        SegmentMode::Fixed,
        SegmentMode::Smart,
        SegmentMode::Punctuation,
        SegmentMode::Sentence,
        SegmentMode::Paragraph,
    ];
}

impl fmt::Display for SegmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(SegmentMode::Fixed),
            "smart" => Ok(SegmentMode::Smart),
            "punctuation" | "v2" => Ok(SegmentMode::Punctuation),
            "sentence" => Ok(SegmentMode::Sentence),
            "paragraph" => Ok(SegmentMode::Paragraph),
            _ => Err(format!(
                "Unknown segment mode: {}. Available: fixed, smart, punctuation, sentence, paragraph",
                s
            )),
        }
    }
}

/// Segmentation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOptions {
    pub mode: SegmentMode,
    /// Target (and, except in punctuation mode, maximum) chunk length
    pub max_chars: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            mode: SegmentMode::Fixed,
            max_chars: 300,
        }
    }
}

/// Split `text` into dense, 1-based chunks according to `options`.
///
/// A piece without any letter or digit is folded into the piece after it;
/// only a final such fragment is dropped. The result never contains a chunk
/// that cannot be spoken.
pub fn segment(text: &str, options: &SegmentOptions) -> Vec<TextChunk> {
    let size = options.max_chars.max(1);

    let pieces = match options.mode {
        SegmentMode::Fixed => window::fixed(&collapse_to_spaces(text), size),
        SegmentMode::Smart => window::smart(&collapse_to_spaces(text), size),
        SegmentMode::Punctuation => window::punctuation_first(&collapse_to_spaces(text), size),
        SegmentMode::Sentence => sentence::split(&collapse_lines(text), size, true),
        SegmentMode::Paragraph => sentence::split(&collapse_lines(text), size, false),
    };

    fold_unspeakable(pieces)
        .into_iter()
        .enumerate()
        .map(|(i, text)| TextChunk {
            index: i + 1,
            original_length: text.chars().count(),
            text,
        })
        .collect()
}

fn fold_unspeakable(pieces: Vec<String>) -> Vec<String> {
    let mut kept = Vec::with_capacity(pieces.len());
    let mut carried = String::new();
    for piece in pieces {
        if !carried.is_empty() {
            carried.push(' ');
        }
        carried.push_str(&piece);
        if is_speakable(&piece) {
            kept.push(std::mem::take(&mut carried));
        }
    }
    kept
}

/// Collapse every whitespace run, newlines included, to a single space
pub fn collapse_to_spaces(text: &str) -> Vec<char> {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    joined.chars().collect()
}

/// Collapse whitespace within lines, dropping blank lines but keeping line breaks
fn collapse_lines(text: &str) -> Vec<char> {
    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();
    lines.join("\n").chars().collect()
}

/// True if the text contains at least one letter or digit in any script
pub fn is_speakable(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

/// Remove terminal punctuation so the backend does not read it aloud.
/// Dashes are kept.
pub fn strip_trailing_punctuation(text: &str) -> &str {
    text.trim_end()
        .trim_end_matches(|c: char| TRAILING_PUNCTUATION.contains(&c) || c.is_whitespace())
}

fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

fn is_clause_break(c: char) -> bool {
    CLAUSE_BREAKS.contains(&c)
}

/// Trim a character range and push it if anything is left
fn push_piece(pieces: &mut Vec<String>, chars: &[char]) {
    let piece: String = chars.iter().collect();
    let piece = piece.trim();
    if !piece.is_empty() {
        pieces.push(piece.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn rejoin(chunks: &[TextChunk]) -> String {
        let joined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        normalized(&joined)
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!(
                "Sentence number {} talks about   the weather, the sea and the hills.\n",
                i
            ));
            if i % 7 == 0 {
                text.push_str("\n\nA short one! Really? Yes; indeed: it is.  ");
            }
        }
        text
    }

    #[test]
    fn test_every_mode_covers_input() {
        let text = sample_text();
        for mode in SegmentMode::ALL {
            let chunks = segment(&text, &SegmentOptions { mode, max_chars: 120 });
            assert_eq!(rejoin(&chunks), normalized(&text), "mode {}", mode);
        }
    }

    #[test]
    fn test_punctuation_mode_keeps_stray_separators() {
        let text = format!("{}, - {}", "a".repeat(19), "bbbb ".repeat(10).trim_end());
        let chunks = segment(
            &text,
            &SegmentOptions {
                mode: SegmentMode::Punctuation,
                max_chars: 20,
            },
        );
        assert_eq!(rejoin(&chunks), normalized(&text));
    }

    #[test]
    fn test_unspeakable_pieces_fold_forward() {
        let pieces = ["Hello there", "...", "--", "world", "!!"]
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(
            fold_unspeakable(pieces),
            vec!["Hello there".to_string(), "... -- world".to_string()]
        );
    }

    #[test]
    fn test_indices_dense_from_one() {
        let text = sample_text();
        for mode in SegmentMode::ALL {
            let chunks = segment(&text, &SegmentOptions { mode, max_chars: 90 });
            let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
            let expected: Vec<usize> = (1..=chunks.len()).collect();
            assert_eq!(indices, expected, "mode {}", mode);
        }
    }

    #[test]
    fn test_no_empty_chunks() {
        let text = sample_text();
        for mode in SegmentMode::ALL {
            for chunk in segment(&text, &SegmentOptions { mode, max_chars: 50 }) {
                assert!(!chunk.text.trim().is_empty());
                assert_eq!(chunk.original_length, chunk.text.chars().count());
            }
        }
    }

    #[test]
    fn test_size_bounds() {
        let text = sample_text();
        for mode in [
            SegmentMode::Fixed,
            SegmentMode::Smart,
            SegmentMode::Sentence,
            SegmentMode::Paragraph,
        ] {
            for chunk in segment(&text, &SegmentOptions { mode, max_chars: 100 }) {
                assert!(chunk.original_length <= 100, "mode {}: {:?}", mode, chunk);
            }
        }
        for chunk in segment(
            &text,
            &SegmentOptions {
                mode: SegmentMode::Punctuation,
                max_chars: 100,
            },
        ) {
            assert!(chunk.original_length <= 200, "{:?}", chunk);
        }
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        for mode in SegmentMode::ALL {
            let options = SegmentOptions { mode, max_chars: 100 };
            assert!(segment("", &options).is_empty());
            assert!(segment("   \n\t  \n", &options).is_empty());
        }
    }

    #[test]
    fn test_trailing_meaningless_fragment_dropped() {
        let text = format!("{} \" .", "word ".repeat(30));
        let chunks = segment(
            &text,
            &SegmentOptions {
                mode: SegmentMode::Fixed,
                max_chars: 149,
            },
        );
        assert!(chunks.iter().all(|c| is_speakable(&c.text)));
        assert!(!chunks.last().unwrap().text.ends_with('"'));
    }

    #[test]
    fn test_unicode_lengths_are_chars() {
        let text = "Xin chào thế giới. ".repeat(50);
        let chunks = segment(
            &text,
            &SegmentOptions {
                mode: SegmentMode::Fixed,
                max_chars: 60,
            },
        );
        for chunk in &chunks {
            assert!(chunk.original_length <= 60);
        }
        assert_eq!(rejoin(&chunks), normalized(&text));
    }

    #[test]
    fn test_strip_trailing_punctuation() {
        assert_eq!(strip_trailing_punctuation("Hello there."), "Hello there");
        assert_eq!(strip_trailing_punctuation("Wait?! "), "Wait");
        assert_eq!(strip_trailing_punctuation("a list;:,"), "a list");
        assert_eq!(strip_trailing_punctuation("well -"), "well -");
        assert_eq!(strip_trailing_punctuation("终于。"), "终于");
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("smart".parse::<SegmentMode>(), Ok(SegmentMode::Smart));
        assert_eq!("v2".parse::<SegmentMode>(), Ok(SegmentMode::Punctuation));
        assert!("bogus".parse::<SegmentMode>().is_err());
        for mode in SegmentMode::ALL {
            assert_eq!(mode.as_str().parse::<SegmentMode>(), Ok(mode));
        }
    }
}
