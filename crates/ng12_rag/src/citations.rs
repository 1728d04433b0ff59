use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::index::ScoredPassage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub page: u32,
    pub chunk_id: String,
    pub excerpt: String,
}

/// One citation per distinct chunk_id, first occurrence wins, input order kept.
pub fn extract(accepted: &[ScoredPassage], max_excerpt_len: usize) -> Vec<Citation> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut out = Vec::new();
    for sp in accepted {
        if !seen.insert(sp.chunk_id()) {
            continue;
        }
        out.push(Citation {
            page: sp.page(),
            chunk_id: sp.chunk_id().to_string(),
            excerpt: excerpt(&sp.passage.text, max_excerpt_len).to_string(),
        });
    }
    out
}

/// A verbatim slice of `text`, at most `max_chars` characters long.
///
/// Leading whitespace is skipped. Text that fits is returned whole (right-trimmed). Otherwise
/// the cut falls on the last sentence end in the back half of the window, or else on the last
/// whitespace. A single word longer than the window is cut at `max_chars`.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    let text = text.trim_start();
    if max_chars == 0 {
        return "";
    }

    // Byte offset just past the first `max_chars` characters, if the text is longer.
    let window_end = match text.char_indices().nth(max_chars) {
        Some((idx, _)) => idx,
        None => return text.trim_end(),
    };
    // A window ending exactly before whitespace already ends on a word boundary.
    let next_is_space = text[window_end..]
        .chars()
        .next()
        .map(char::is_whitespace)
        .unwrap_or(true);
    let window = &text[..window_end];
    if next_is_space {
        return window.trim_end();
    }

    let half = window.len() / 2;
    let sentence_cut = window
        .char_indices()
        .zip(window.chars().skip(1))
        .filter(|((_, c), next)| matches!(c, '.' | '!' | '?') && next.is_whitespace())
        .map(|((i, c), _)| i + c.len_utf8())
        .filter(|&end| end >= half)
        .last();
    if let Some(end) = sentence_cut {
        return &window[..end];
    }

    match window.rfind(char::is_whitespace) {
        Some(ws) => {
            let cut = window[..ws].trim_end();
            if cut.is_empty() {
                window
            } else {
                cut
            }
        }
        None => window,
    }
}
