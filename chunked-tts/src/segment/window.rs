// Window-based splitters operating on space-collapsed text

use super::{is_clause_break, is_terminator, push_piece};

/// Smart mode only looks this far back from the end of a window
const SMART_TAIL: usize = 100;

/// Punctuation mode never cuts a piece this short or shorter
const MIN_PIECE_CHARS: usize = 5;

/// Break characters recognised by smart mode
const SMART_BREAKS: &[char] = &['!', '.', ',', '-', '?', ';', ':'];

/// Fixed windows of at most `size` characters.
///
/// A cut is searched for in the last fifth of the window: sentence
/// terminator, then comma-class separator, then the last space in the back
/// half of the window, then a hard cut.
pub(super) fn fixed(chars: &[char], size: usize) -> Vec<String> {
    let n = chars.len();
    let mut pieces = Vec::new();
    let mut start = skip_spaces(chars, 0);

    while start < n {
        let end = (start + size).min(n);
        let cut = if end == n {
            n
        } else {
            let tail = end - (size / 5).max(1).min(end - start);
            rfind_break(chars, tail, end, is_terminator)
                .or_else(|| rfind_break(chars, tail, end, is_clause_break))
                .or_else(|| rfind_space(chars, (start + size / 2).max(start + 1), end))
                .unwrap_or(end)
        };

        push_piece(&mut pieces, &chars[start..cut]);
        start = skip_spaces(chars, cut);
    }

    pieces
}

/// Smart mode for backends with small per-call caps.
///
/// Looks for a break character in the final 100 characters of the window
/// (followed by a space or the end of the window), then the last space. A
/// break that would leave a chunk shorter than half the window is replaced
/// with a hard cut at `size`.
pub(super) fn smart(chars: &[char], size: usize) -> Vec<String> {
    let n = chars.len();
    let mut pieces = Vec::new();
    let mut start = skip_spaces(chars, 0);

    while start < n {
        let end = (start + size).min(n);
        let cut = if end == n {
            n
        } else {
            let tail = end.saturating_sub(SMART_TAIL).max(start);
            let found = (tail..end)
                .rev()
                .find(|&i| {
                    SMART_BREAKS.contains(&chars[i]) && (i + 1 == end || chars[i + 1] == ' ')
                })
                .map(|i| i + 1)
                .or_else(|| rfind_space(chars, start + 1, end));

            match found {
                Some(cut) if cut - start >= size / 2 => cut,
                _ => end,
            }
        };

        push_piece(&mut pieces, &chars[start..cut]);
        start = skip_spaces(chars, cut);
    }

    pieces
}

/// Punctuation-first mode.
///
/// Searches the whole window for a terminator, then a secondary separator.
/// Failing both, it looks forward past the target, up to one more window,
/// for any break punctuation before falling back to the last space, then a
/// hard cut. Chunks may therefore reach `2 * size` characters. No in-window
/// cut leaves a piece of `MIN_PIECE_CHARS` or fewer.
pub(super) fn punctuation_first(chars: &[char], size: usize) -> Vec<String> {
    let n = chars.len();
    let mut pieces = Vec::new();
    let mut start = skip_spaces(chars, 0);

    let is_secondary = |c: char| is_clause_break(c) || c == '-';
    let is_any_break = |c: char| is_terminator(c) || is_secondary(c);

    while start < n {
        let end = (start + size).min(n);
        let cut = if end == n {
            n
        } else {
            let limit = (start + 2 * size).min(n);
            let earliest = (start + MIN_PIECE_CHARS).min(end);
            rfind_break(chars, earliest, end, is_terminator)
                .or_else(|| rfind_break(chars, earliest, end, is_secondary))
                .or_else(|| {
                    (end..limit)
                        .find(|&i| is_any_break(chars[i]) && followed_by_gap(chars, i))
                        .map(|i| i + 1)
                })
                .or_else(|| rfind_space(chars, earliest.max(start + 1), end))
                .unwrap_or(end)
        };

        push_piece(&mut pieces, &chars[start..cut]);
        start = skip_spaces(chars, cut);
    }

    pieces
}

fn skip_spaces(chars: &[char], mut at: usize) -> usize {
    while at < chars.len() && chars[at] == ' ' {
        at += 1;
    }
    at
}

fn followed_by_gap(chars: &[char], i: usize) -> bool {
    i + 1 == chars.len() || chars[i + 1] == ' '
}

/// Last `i` in `from..to` matching `pred` and followed by a space or the end
/// of the text; returns the cut position `i + 1`
fn rfind_break(chars: &[char], from: usize, to: usize, pred: impl Fn(char) -> bool) -> Option<usize> {
    (from..to)
        .rev()
        .find(|&i| pred(chars[i]) && followed_by_gap(chars, i))
        .map(|i| i + 1)
}

/// Last space in `from..=to`; the cut excludes the space itself
fn rfind_space(chars: &[char], from: usize, to: usize) -> Option<usize> {
    let to = to.min(chars.len().saturating_sub(1));
    if from > to {
        return None;
    }
    (from..=to).rev().find(|&i| chars[i] == ' ')
}
