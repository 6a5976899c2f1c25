//! Sentence-boundary trimmer for replies produced under an output-token cap.
//!
//! A reply that hit the cap usually stops mid-sentence. When the text is
//! long enough to plausibly have been cut off and does not already end
//! cleanly, cut back to the last sentence boundary and say so, rather than
//! showing a reply that trails off mid-word.

const CHARS_PER_TOKEN: usize = 4;

/// Boundaries earlier than this fraction of the text are ignored; cutting
/// there would discard more than it saves.
const MIN_BOUNDARY_FRACTION: f64 = 0.4;

pub const TRUNCATION_NOTICE: &str = "\n\n[reply trimmed at the last complete sentence]";

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '…', '。', '！', '？'];
const TRAILING_CLOSERS: &[char] = &['"', '\'', '“', '”', '’', '」', '』', ')', ']', '}', '`', '*', '_'];

/// Trim `text` when it looks like it was cut off by `max_tokens`.
/// Returns the input unchanged when it is short of the cap, already ends
/// cleanly, or has no usable sentence boundary.
pub fn trim_capped_reply(text: &str, max_tokens: u32) -> String {
    let chars: Vec<char> = text.chars().collect();
    let estimated_cap_chars = max_tokens as usize * CHARS_PER_TOKEN;
    if chars.len() < estimated_cap_chars {
        return text.to_string();
    }
    if ends_cleanly(text) {
        return text.to_string();
    }

    let min_index = (chars.len() as f64 * MIN_BOUNDARY_FRACTION) as usize;
    match last_sentence_boundary(&chars) {
        Some(end) if end > min_index => {
            let kept: String = chars[..end].iter().collect();
            format!("{kept}{TRUNCATION_NOTICE}")
        }
        // A boundary too early (or none at all) means trimming would throw
        // away content; keep the text as-is.
        _ => text.to_string(),
    }
}

/// True when the text already ends on sentence-terminating punctuation
/// (optionally followed by closing quotes/brackets/fence markers) or on a
/// closing code fence.
fn ends_cleanly(text: &str) -> bool {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return true;
    }
    if trimmed.ends_with("```") {
        return true;
    }

    let stripped = trimmed.trim_end_matches(TRAILING_CLOSERS);
    stripped
        .chars()
        .last()
        .is_some_and(|c| SENTENCE_TERMINATORS.contains(&c))
}

/// Index one past the last sentence terminator that is followed by
/// whitespace, so the cut keeps the punctuation.
fn last_sentence_boundary(chars: &[char]) -> Option<usize> {
    for i in (0..chars.len().saturating_sub(1)).rev() {
        if SENTENCE_TERMINATORS.contains(&chars[i]) && chars[i + 1].is_whitespace() {
            return Some(i + 1);
        }
    }
    None
}
