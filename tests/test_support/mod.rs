#![allow(dead_code)]

use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rslfeedd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rslfeedd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn send_line(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    line: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");

    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    assert!(!out.trim().is_empty(), "empty response for {}", line);
    serde_json::from_str(out.trim()).expect("parse response json")
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    let value = send_line(stdin, reader, &payload.to_string());
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

/// Selects `workspace` so the sidecar creates its schema.
pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

pub fn workspace_db(workspace: &Path) -> Connection {
    Connection::open(workspace.join("rslfeed.sqlite3")).expect("open workspace db")
}

pub fn insert_course(conn: &Connection, table: &str, id: &str, title: &str) {
    let title_col = if table == "legacy_courses" { "name" } else { "title" };
    conn.execute(
        &format!("INSERT INTO {}(id, {}) VALUES(?, ?)", table, title_col),
        (id, title),
    )
    .expect("insert course");
}

pub fn insert_lesson(
    conn: &Connection,
    table: &str,
    id: &str,
    course_id: Option<&str>,
    title: &str,
) {
    let title_col = if table == "legacy_lessons" { "name" } else { "title" };
    conn.execute(
        &format!(
            "INSERT INTO {}(id, course_id, {}) VALUES(?, ?, ?)",
            table, title_col
        ),
        (id, course_id, title),
    )
    .expect("insert lesson");
}

pub fn insert_quiz(
    conn: &Connection,
    id: &str,
    title: &str,
    published: bool,
    lesson_id: Option<&str>,
    created_at: &str,
) {
    conn.execute(
        "INSERT INTO quizzes(id, title, is_published, lesson_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (id, title, published as i64, lesson_id, created_at, created_at),
    )
    .expect("insert quiz");
}

pub fn insert_question(
    conn: &Connection,
    id: &str,
    quiz_id: &str,
    text: &str,
    video: Option<&str>,
    created_at: &str,
) {
    conn.execute(
        "INSERT INTO quiz_questions(id, quiz_id, question_text, rsl_video_url, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (id, quiz_id, text, video, created_at),
    )
    .expect("insert question");
}

pub fn item_ids(result: &serde_json::Value) -> Vec<String> {
    result
        .get("items")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("id").and_then(|v| v.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
