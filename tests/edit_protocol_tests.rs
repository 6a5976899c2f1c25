use colloquy::edits::{EditApplier, EditStatus, LocalFiles, StaticProjectRoot};
use colloquy::protocol::{parse, Segment};
use std::fs;
use std::sync::Arc;

fn reconstruct(text: &str, segments: &[Segment]) -> String {
    segments.iter().map(|s| s.raw(text)).collect()
}

#[test]
fn test_realistic_reply_parses_losslessly() {
    let text = concat!(
        "I'll restructure the module.\n\n",
        "<<<FILE:src/parser.rs>>>\n",
        "pub fn parse(input: &str) -> Vec<Token> {\n",
        "    lex(input).collect()\n",
        "}\n",
        "<<<END_FILE>>>\n\n",
        "The old shim is no longer needed:\n",
        "<<<DELETE_FILE:src/parser_shim.rs>>>\n\n",
        "Run the tests to confirm."
    );
    let segments = parse(text);

    assert_eq!(reconstruct(text, &segments), text);
    let kinds: Vec<&str> = segments
        .iter()
        .map(|s| match s {
            Segment::Prose { .. } => "prose",
            Segment::Write { .. } => "write",
            Segment::Delete { .. } => "delete",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["prose", "write", "prose", "delete", "prose"]
    );

    match &segments[1] {
        Segment::Write { path, content, .. } => {
            assert_eq!(path, "src/parser.rs");
            assert!(content.starts_with("pub fn parse"));
            assert!(content.ends_with('}'));
        }
        other => panic!("unexpected segment: {other:?}"),
    }
}

#[test]
fn test_markers_inside_code_fences_still_parse() {
    // The protocol has no fence awareness on purpose; a marker is a marker.
    let text = "```\n<<<FILE:a.txt>>>\nbody\n<<<END_FILE>>>\n```";
    let segments = parse(text);
    assert!(segments.iter().any(|s| matches!(s, Segment::Write { .. })));
    assert_eq!(reconstruct(text, &segments), text);
}

#[test]
fn test_malformed_markers_never_lose_text() {
    let inputs = [
        "<<<FILE:unclosed",
        "<<<FILE:a>>> missing newline <<<END_FILE>>>",
        "<<<DELETE_FILE:>>>",
        "<<<DELETE_FILE:no_close",
        "text <<< with stray angle runs >>> text",
    ];
    for text in inputs {
        let segments = parse(text);
        assert_eq!(reconstruct(text, &segments), text, "input: {text:?}");
        assert!(
            segments.iter().all(|s| s.is_prose()),
            "input should be all prose: {text:?}"
        );
    }
}

#[tokio::test]
async fn test_parse_then_apply_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join("stale.cfg"), "old").unwrap();
    let applier = EditApplier::new(
        Arc::new(LocalFiles),
        Arc::new(StaticProjectRoot(dir.path().to_path_buf())),
    );

    let text = concat!(
        "Updating the config.\n",
        "<<<FILE:conf/app.toml>>>\n",
        "[app]\nname = \"demo\"\n",
        "<<<END_FILE>>>\n",
        "<<<DELETE_FILE:stale.cfg>>>\n",
        "All set."
    );
    let reports = applier.apply(&parse(text), |_| {}).await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.status == EditStatus::Done));
    assert_eq!(
        fs::read_to_string(dir.path().join("conf/app.toml")).unwrap(),
        "[app]\nname = \"demo\""
    );
    assert!(!dir.path().join("stale.cfg").exists());
}
