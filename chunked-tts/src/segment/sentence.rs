// Line-aware splitting for the sentence and paragraph modes

use super::{is_clause_break, is_terminator, push_piece};

/// A terminator only ends a sentence once the sentence is longer than this
const MIN_SENTENCE_CHARS: usize = 5;

/// Split line-preserving text into pieces, then pack them into chunks.
///
/// Newlines always end a piece. With `split_on_terminators`, a sentence
/// terminator also ends one. A piece reaching `size` characters is cut at the
/// last terminator, clause break or space seen, else hard-cut.
pub(super) fn split(chars: &[char], size: usize, split_on_terminators: bool) -> Vec<String> {
    pack(break_pieces(chars, size, split_on_terminators), size)
}

fn is_sentence_end(c: char) -> bool {
    is_terminator(c) || c == ':'
}

fn break_pieces(chars: &[char], size: usize, split_on_terminators: bool) -> Vec<String> {
    let n = chars.len();
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut last_end: Option<usize> = None;
    let mut last_clause: Option<usize> = None;
    let mut last_space: Option<usize> = None;

    while i < n {
        let c = chars[i];

        if c == '\n' {
            push_piece(&mut pieces, &chars[start..i]);
            start = i + 1;
            i += 1;
            (last_end, last_clause, last_space) = (None, None, None);
            continue;
        }

        if split_on_terminators && is_sentence_end(c) && i > start + MIN_SENTENCE_CHARS {
            push_piece(&mut pieces, &chars[start..=i]);
            start = i + 1;
            i += 1;
            (last_end, last_clause, last_space) = (None, None, None);
            continue;
        }

        if i - start >= size {
            let cut = last_end
                .map(|p| p + 1)
                .or(last_clause.map(|p| p + 1))
                .or(last_space.filter(|&p| p > start))
                .unwrap_or(start + size);
            push_piece(&mut pieces, &chars[start..cut]);
            start = cut;
            i = cut;
            (last_end, last_clause, last_space) = (None, None, None);
            continue;
        }

        if is_sentence_end(c) {
            last_end = Some(i);
        }
        if is_clause_break(c) {
            last_clause = Some(i);
        }
        if c == ' ' {
            last_space = Some(i);
        }
        i += 1;
    }

    if start < n {
        push_piece(&mut pieces, &chars[start..n]);
    }

    pieces
}

/// Greedily join consecutive pieces with newlines while the result stays
/// shorter than `size`
fn pack(pieces: Vec<String>, size: usize) -> Vec<String> {
    let mut packed = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let len = piece.chars().count();
        if current.is_empty() {
            current = piece;
            current_len = len;
        } else if current_len + 1 + len < size {
            current.push('\n');
            current.push_str(&piece);
            current_len += 1 + len;
        } else {
            packed.push(std::mem::take(&mut current));
            current = piece;
            current_len = len;
        }
    }

    if !current.is_empty() {
        packed.push(current);
    }

    packed
}
