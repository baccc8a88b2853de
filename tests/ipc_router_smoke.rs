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
    let exe = env!("CARGO_BIN_EXE_classflowd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classflowd");
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
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(resp: &serde_json::Value) -> &str {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("classflow-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));

    // Everything that touches the store requires a workspace first.
    let blocked = request(
        &mut stdin,
        &mut reader,
        "1b",
        "students.list",
        json!({ "teacherId": "nobody" }),
    );
    assert_eq!(error_code(&blocked), "no_workspace");

    // calendar.shift is pure date math and works without one.
    let shifted = request_ok(
        &mut stdin,
        &mut reader,
        "1c",
        "calendar.shift",
        json!({ "mode": "day", "cursor": "2024-05-31", "direction": "next" }),
    );
    assert_eq!(
        shifted.get("cursor").and_then(|v| v.as_str()),
        Some("2024-06-01")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        json!({ "name": "Smoke Teacher", "email": "Smoke@Example.com" }),
    );
    let teacher_id = teacher
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();
    assert_eq!(
        teacher.get("email").and_then(|v| v.as_str()),
        Some("smoke@example.com")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.get",
        json!({ "teacherId": teacher_id }),
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "teacherId": teacher_id,
            "name": "Smoke Student",
            "lessonValue": 80.0,
            "paymentDay": 10
        }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.update",
        json!({
            "teacherId": teacher_id,
            "studentId": student_id,
            "patch": { "studentEmail": "kid@example.com" }
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "teacherId": teacher_id }),
    );

    let lesson = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "lessons.create",
        json!({
            "teacherId": teacher_id,
            "studentId": student_id,
            "date": "2024-05-06",
            "time": "10:00"
        }),
    );
    let lesson_id = lesson
        .get("lessonId")
        .and_then(|v| v.as_str())
        .expect("lessonId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "lessons.update",
        json!({
            "teacherId": teacher_id,
            "studentId": student_id,
            "lessonId": lesson_id,
            "patch": { "time": "11:30", "durationMinutes": 45 }
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "lessons.setStatus",
        json!({
            "teacherId": teacher_id,
            "studentId": student_id,
            "lessonId": lesson_id,
            "status": "completed"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "lessons.batchCreate",
        json!({
            "teacherId": teacher_id,
            "studentId": student_id,
            "startDate": "2024-05-01",
            "endDate": "2024-05-31",
            "time": "14:00",
            "durationMinutes": 60,
            "weekdays": [2, 4]
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "lessons.delete",
        json!({
            "teacherId": teacher_id,
            "studentId": student_id,
            "lessonId": lesson_id
        }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "dashboard.metrics",
        json!({ "teacherId": teacher_id, "today": "2024-05-15" }),
    );

    for (id, mode) in [("14", "month"), ("15", "week"), ("16", "day")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "calendar.view",
            json!({ "teacherId": teacher_id, "mode": mode, "cursor": "2024-05-15" }),
        );
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "teachers.subscribe",
        json!({ "teacherId": teacher_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "teachers.unsubscribe",
        json!({ "teacherId": teacher_id }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "students.delete",
        json!({ "teacherId": teacher_id, "studentId": student_id }),
    );

    let unknown = request(&mut stdin, &mut reader, "20", "nope.nothing", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
