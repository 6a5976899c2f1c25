//! Parser for the text-embedded edit protocol.
//!
//! Assistant replies may carry file mutations inline:
//!
//! ```text
//! <<<FILE:relative/or/absolute/path>>>
//! <full replacement content, may be empty>
//! <<<END_FILE>>>
//!
//! <<<DELETE_FILE:relative/or/absolute/path>>>
//! ```
//!
//! The parse is lossless: every segment records its raw byte span, and the
//! spans concatenated in order reconstruct the input exactly. A candidate
//! marker that does not complete (missing `>>>`, newline in the path,
//! missing `<<<END_FILE>>>`) is plain prose.

use aho_corasick::{AhoCorasick, MatchKind};
use std::ops::Range;
use std::sync::OnceLock;

const DELETE_OPEN: &str = "<<<DELETE_FILE:";
const FILE_OPEN: &str = "<<<FILE:";
const MARKER_CLOSE: &str = ">>>";
const FILE_END: &str = "<<<END_FILE>>>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Prose {
        span: Range<usize>,
    },
    Write {
        path: String,
        content: String,
        span: Range<usize>,
    },
    Delete {
        path: String,
        span: Range<usize>,
    },
}

impl Segment {
    pub fn span(&self) -> Range<usize> {
        match self {
            Self::Prose { span } | Self::Write { span, .. } | Self::Delete { span, .. } => {
                span.clone()
            }
        }
    }

    /// The exact input slice this segment was parsed from.
    pub fn raw<'a>(&self, text: &'a str) -> &'a str {
        &text[self.span()]
    }

    pub fn is_prose(&self) -> bool {
        matches!(self, Self::Prose { .. })
    }
}

fn marker_scanner() -> &'static AhoCorasick {
    static SCANNER: OnceLock<AhoCorasick> = OnceLock::new();
    SCANNER.get_or_init(|| {
        AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostFirst)
            .build([DELETE_OPEN, FILE_OPEN])
            .expect("marker patterns are valid")
    })
}

/// Split `text` into ordered prose / write / delete segments, scanning
/// left to right over the two marker alternatives.
pub fn parse(text: &str) -> Vec<Segment> {
    let scanner = marker_scanner();
    let mut segments = Vec::new();
    let mut prose_start = 0;
    let mut pos = 0;

    while let Some(found) = scanner.find(&text[pos..]) {
        let start = pos + found.start();
        let is_delete = found.pattern().as_usize() == 0;
        let parsed = if is_delete {
            parse_delete(text, start)
        } else {
            parse_write(text, start)
        };

        match parsed {
            Some(segment) => {
                if prose_start < start {
                    segments.push(Segment::Prose {
                        span: prose_start..start,
                    });
                }
                let end = segment.span().end;
                segments.push(segment);
                prose_start = end;
                pos = end;
            }
            // Incomplete marker; leave it inside the surrounding prose and
            // resume the scan one byte further.
            None => pos = start + 1,
        }

        if pos >= text.len() {
            break;
        }
    }

    if segments.is_empty() {
        // Zero markers: one prose segment covering the whole input.
        return vec![Segment::Prose { span: 0..text.len() }];
    }

    if prose_start < text.len() {
        segments.push(Segment::Prose {
            span: prose_start..text.len(),
        });
    }

    segments
}

/// `<<<DELETE_FILE:` PATH `>>>` where PATH is one or more characters
/// excluding '>' and newline.
fn parse_delete(text: &str, start: usize) -> Option<Segment> {
    let path_start = start + DELETE_OPEN.len();
    let (raw_path, path_end) = scan_path(text, path_start)?;
    if !text[path_end..].starts_with(MARKER_CLOSE) {
        return None;
    }
    let end = path_end + MARKER_CLOSE.len();
    Some(Segment::Delete {
        path: raw_path.trim().to_string(),
        span: start..end,
    })
}

/// `<<<FILE:` PATH `>>>` `\n` CONTENT `<<<END_FILE>>>` with CONTENT matched
/// non-greedily up to the nearest end marker, so adjacent blocks never
/// merge. A single newline directly before the end marker belongs to the
/// framing, not the content; stripping it is what makes
/// `<<<FILE:a>>>\n\n<<<END_FILE>>>` an intentionally empty file.
fn parse_write(text: &str, start: usize) -> Option<Segment> {
    let path_start = start + FILE_OPEN.len();
    let (raw_path, path_end) = scan_path(text, path_start)?;
    if !text[path_end..].starts_with(MARKER_CLOSE) {
        return None;
    }
    let header_end = path_end + MARKER_CLOSE.len();
    if !text[header_end..].starts_with('\n') {
        return None;
    }
    let content_start = header_end + 1;
    let content_len = text[content_start..].find(FILE_END)?;
    let end = content_start + content_len + FILE_END.len();

    let mut content = &text[content_start..content_start + content_len];
    if let Some(stripped) = content.strip_suffix('\n') {
        content = stripped;
    }

    Some(Segment::Write {
        path: raw_path.trim().to_string(),
        content: content.to_string(),
        span: start..end,
    })
}

/// The run of path characters beginning at `from`: at least one character,
/// no '>' and no newline. Returns the raw run and the index just past it.
fn scan_path(text: &str, from: usize) -> Option<(&str, usize)> {
    let rest = &text[from..];
    let len = rest
        .find(|c: char| c == '>' || c == '\n')
        .unwrap_or(rest.len());
    if len == 0 {
        return None;
    }
    Some((&rest[..len], from + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(text: &str, segments: &[Segment]) -> String {
        segments.iter().map(|s| s.raw(text)).collect()
    }

    #[test]
    fn test_plain_text_is_one_prose_segment() {
        let text = "no markers anywhere in this reply";
        let segments = parse(text);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0], Segment::Prose { span: 0..text.len() });
        assert_eq!(reconstruct(text, &segments), text);
    }

    #[test]
    fn test_empty_input_is_one_empty_prose_segment() {
        let segments = parse("");
        assert_eq!(segments, vec![Segment::Prose { span: 0..0 }]);
    }

    #[test]
    fn test_write_block_with_surrounding_prose() {
        let text = "Here you go:\n<<<FILE:src/lib.rs>>>\npub fn f() {}\n<<<END_FILE>>>\nEnjoy.";
        let segments = parse(text);
        assert_eq!(segments.len(), 3);
        assert!(segments[0].is_prose());
        match &segments[1] {
            Segment::Write { path, content, .. } => {
                assert_eq!(path, "src/lib.rs");
                assert_eq!(content, "pub fn f() {}");
            }
            other => panic!("unexpected segment: {other:?}"),
        }
        assert!(segments[2].is_prose());
        assert_eq!(reconstruct(text, &segments), text);
    }

    #[test]
    fn test_empty_content_write_block() {
        let text = "<<<FILE:a>>>\n\n<<<END_FILE>>>";
        let segments = parse(text);
        assert_eq!(segments.len(), 1);
        match &segments[0] {
            Segment::Write { path, content, .. } => {
                assert_eq!(path, "a");
                assert_eq!(content, "");
            }
            other => panic!("unexpected segment: {other:?}"),
        }
        assert_eq!(reconstruct(text, &segments), text);
    }

    #[test]
    fn test_adjacent_write_blocks_do_not_merge() {
        let text = "<<<FILE:a>>>\nX<<<END_FILE>>><<<FILE:b>>>\nY<<<END_FILE>>>";
        let segments = parse(text);
        assert_eq!(segments.len(), 2);
        match (&segments[0], &segments[1]) {
            (
                Segment::Write {
                    path: p0,
                    content: c0,
                    ..
                },
                Segment::Write {
                    path: p1,
                    content: c1,
                    ..
                },
            ) => {
                assert_eq!((p0.as_str(), c0.as_str()), ("a", "X"));
                assert_eq!((p1.as_str(), c1.as_str()), ("b", "Y"));
            }
            other => panic!("unexpected segments: {other:?}"),
        }
        assert_eq!(reconstruct(text, &segments), text);
    }

    #[test]
    fn test_delete_marker() {
        let text = "Removing it.\n<<<DELETE_FILE:old/config.yaml>>>\nDone.";
        let segments = parse(text);
        assert_eq!(segments.len(), 3);
        match &segments[1] {
            Segment::Delete { path, .. } => assert_eq!(path, "old/config.yaml"),
            other => panic!("unexpected segment: {other:?}"),
        }
        assert_eq!(reconstruct(text, &segments), text);
    }

    #[test]
    fn test_paths_are_trimmed_for_use_but_spans_stay_exact() {
        let text = "<<<DELETE_FILE: padded/path.txt >>>";
        let segments = parse(text);
        match &segments[0] {
            Segment::Delete { path, span } => {
                assert_eq!(path, "padded/path.txt");
                assert_eq!(&text[span.clone()], text);
            }
            other => panic!("unexpected segment: {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_write_block_is_prose() {
        let text = "<<<FILE:a>>>\nno end marker here";
        let segments = parse(text);
        assert_eq!(segments, vec![Segment::Prose { span: 0..text.len() }]);
    }

    #[test]
    fn test_marker_with_newline_in_path_is_prose() {
        let text = "<<<FILE:a\nb>>>\nX<<<END_FILE>>>";
        let segments = parse(text);
        assert!(segments.iter().all(Segment::is_prose));
        assert_eq!(reconstruct(text, &segments), text);
    }

    #[test]
    fn test_write_marker_missing_newline_is_prose() {
        let text = "<<<FILE:a>>>X<<<END_FILE>>>";
        let segments = parse(text);
        assert!(segments.iter().all(Segment::is_prose));
        assert_eq!(reconstruct(text, &segments), text);
    }

    #[test]
    fn test_delete_then_write_keeps_order() {
        let text = "<<<DELETE_FILE:gone.txt>>> and then <<<FILE:new.txt>>>\nhello\n<<<END_FILE>>>";
        let segments = parse(text);
        assert_eq!(segments.len(), 3);
        assert!(matches!(segments[0], Segment::Delete { .. }));
        assert!(segments[1].is_prose());
        assert!(matches!(segments[2], Segment::Write { .. }));
        assert_eq!(reconstruct(text, &segments), text);
    }

    #[test]
    fn test_content_preserves_interior_newlines() {
        let text = "<<<FILE:multi.txt>>>\nline one\n\nline three\n<<<END_FILE>>>";
        let segments = parse(text);
        match &segments[0] {
            Segment::Write { content, .. } => {
                assert_eq!(content, "line one\n\nline three");
            }
            other => panic!("unexpected segment: {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_law_over_mixed_inputs() {
        let inputs = [
            "",
            "plain",
            "<<<",
            "<<<FILE:",
            "<<<FILE:>>>\nX<<<END_FILE>>>",
            "a<<<DELETE_FILE:x>>>b<<<FILE:y>>>\nz\n<<<END_FILE>>>c",
            "<<<FILE:a>>>\nX<<<END_FILE>>><<<FILE:b>>>\nY<<<END_FILE>>>",
            "nested <<<FILE:a>>>\n<<<FILE:b>>>\ninner\n<<<END_FILE>>> tail",
        ];
        for text in inputs {
            let segments = parse(text);
            assert_eq!(reconstruct(text, &segments), *text, "input: {text:?}");
        }
    }
}
