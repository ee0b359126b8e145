use super::*;
use std::io::Write;

fn write_transcript(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[test]
fn returns_last_assistant_text_block() {
    let file = write_transcript(&[
        r#"{"type":"user","message":{"role":"user","content":"check the task"}}"#,
        r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"first answer"}]}}"#,
        r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"task complete, all requirements met"}]}}"#,
    ]);
    let text = last_assistant_text(file.path().to_str().unwrap()).unwrap();
    assert_eq!(text.as_deref(), Some("task complete, all requirements met"));
}

#[test]
fn skips_tool_use_blocks_and_bad_lines() {
    let file = write_transcript(&[
        "this is not json",
        r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","name":"Bash"},{"type":"text","text":"running tests"}]}}"#,
    ]);
    let text = last_assistant_text(file.path().to_str().unwrap()).unwrap();
    assert_eq!(text.as_deref(), Some("running tests"));
}

#[test]
fn missing_file_reads_as_none() {
    let text = last_assistant_text("/nonexistent/transcript.jsonl").unwrap();
    assert!(text.is_none());
}

#[test]
fn string_content_is_returned_verbatim() {
    let file = write_transcript(&[
        r#"{"type":"assistant","message":{"role":"assistant","content":"plain string reply"}}"#,
    ]);
    let text = last_assistant_text(file.path().to_str().unwrap()).unwrap();
    assert_eq!(text.as_deref(), Some("plain string reply"));
}
