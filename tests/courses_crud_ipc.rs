use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_coursebookd");
    let mut child = Command::new(exe)
        .env_remove("COURSEBOOK_WORKSPACE")
        .env_remove("COURSEBOOK_STRICT_COLUMNS")
        .env_remove("COURSEBOOK_ERROR_DISPLAY_LIMIT")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn coursebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
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
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} should fail",
        method
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

fn course_params(code: &str, name: &str, credits: i64, sessions: i64) -> serde_json::Value {
    json!({
        "code": code,
        "name": name,
        "credits": credits,
        "sessionsPerWeek": sessions,
    })
}

#[test]
fn courses_need_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let listed = request_ok(&mut stdin, &mut reader, "1", "courses.list", json!({}));
    assert_eq!(listed["courses"], json!([]));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        course_params("CS101", "Intro", 3, 3),
    );
    assert_eq!(e["code"], "no_workspace");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn course_lifecycle_over_ipc() {
    let workspace = temp_dir("coursebook-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        course_params("  CS101 ", "Intro to Computing", 3, 3),
    );
    let cs_id = created["courseId"].as_i64().expect("courseId");
    assert_eq!(created["course"]["code"], "CS101");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        course_params("MATH201", "Mathematics 1", 2, 1),
    );
    let math_id = created["courseId"].as_i64().expect("courseId");
    assert!(math_id > cs_id);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "courses.create",
        course_params("PHY1", "Physics", 3, 0),
    );
    assert_eq!(e["code"], "invalid_course");
    assert_eq!(e["message"], "sessions out of range");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "courses.create",
        json!({ "code": "PHY1", "credits": 3, "sessionsPerWeek": 2 }),
    );
    assert_eq!(e["message"], "missing course name");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "courses.update",
        json!({ "courseId": cs_id, "name": "Introduction to Computers" }),
    );
    assert_eq!(updated["course"]["name"], "Introduction to Computers");
    assert_eq!(updated["course"]["credits"], 3);

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "courses.get",
        json!({ "courseId": cs_id }),
    );
    assert_eq!(got["course"]["name"], "Introduction to Computers");

    let stats = request_ok(&mut stdin, &mut reader, "8", "courses.stats", json!({}));
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["avgCredits"], 2.5);
    assert_eq!(stats["avgSessionsPerWeek"], 2.0);

    let out = workspace.join("export").join("courses.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "courses.exportCsv",
        json!({ "outPath": out.to_string_lossy() }),
    );
    assert_eq!(exported["rowsExported"], 2);
    let text = std::fs::read_to_string(&out).expect("read export");
    assert!(text.starts_with("course_code,course_name,course_credits,sessions_per_week"));
    assert!(text.contains("MATH201,Mathematics 1,2,1"));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "10",
        "courses.delete",
        json!({ "courseId": 9999 }),
    );
    assert_eq!(e["code"], "not_found");

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "courses.deleteMany",
        json!({ "courseIds": [cs_id, math_id, 9999] }),
    );
    assert_eq!(deleted["deleted"], 2);
    assert_eq!(deleted["message"], "2 course(s) deleted successfully");

    let listed = request_ok(&mut stdin, &mut reader, "12", "courses.list", json!({}));
    assert_eq!(listed["courses"], json!([]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn courses_survive_reopening_the_workspace() {
    let workspace = temp_dir("coursebook-reopen");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        course_params("BIO110", "Biology", 4, 2),
    );
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "2", "courses.list", json!({}));
    let courses = listed["courses"].as_array().cloned().unwrap_or_default();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0]["code"], "BIO110");
    assert_eq!(courses[0]["sessionsPerWeek"], 2);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
