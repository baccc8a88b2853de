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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
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

#[test]
fn deleting_a_student_removes_their_lessons_and_nothing_else() {
    let workspace = temp_dir("classflow-cascade");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "teachers.create",
        json!({ "name": "Cascade Teacher", "email": "cascade@example.com" }),
    );
    let teacher_id = teacher["teacherId"].as_str().expect("teacherId").to_string();

    let doomed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "teacherId": teacher_id, "name": "Doomed", "lessonValue": 50.0 }),
    );
    let doomed_id = doomed["studentId"].as_str().expect("studentId").to_string();

    let keeper = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "teacherId": teacher_id, "name": "Keeper", "lessonValue": 60.0 }),
    );
    let keeper_id = keeper["studentId"].as_str().expect("studentId").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lessons.batchCreate",
        json!({
            "teacherId": teacher_id,
            "studentId": doomed_id,
            "startDate": "2024-06-01",
            "endDate": "2024-06-30",
            "time": "10:00",
            "durationMinutes": 60,
            "weekdays": [1, 3]
        }),
    );
    let keeper_lesson = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "lessons.create",
        json!({
            "teacherId": teacher_id,
            "studentId": keeper_id,
            "date": "2024-06-05",
            "time": "14:00"
        }),
    );
    let keeper_lesson_id = keeper_lesson["lessonId"]
        .as_str()
        .expect("lessonId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.delete",
        json!({ "teacherId": teacher_id, "studentId": doomed_id }),
    );

    // The roster no longer lists the deleted student.
    let listing = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.list",
        json!({ "teacherId": teacher_id }),
    );
    let students = listing["students"].as_array().expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["id"].as_str(), Some(keeper_id.as_str()));
    assert_eq!(students[0]["lessonCount"].as_i64(), Some(1));

    // No orphaned lessons survive anywhere in the snapshot.
    let snapshot = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "teachers.get",
        json!({ "teacherId": teacher_id }),
    );
    let snapshot_students = snapshot["teacher"]["students"].as_array().expect("students");
    assert_eq!(snapshot_students.len(), 1);
    let kept_lessons = snapshot_students[0]["lessons"].as_array().expect("lessons");
    assert_eq!(kept_lessons.len(), 1);
    assert_eq!(
        kept_lessons[0]["id"].as_str(),
        Some(keeper_lesson_id.as_str())
    );

    // A calendar query over June sees only the keeper's lesson.
    let month = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "calendar.view",
        json!({ "teacherId": teacher_id, "mode": "month", "cursor": "2024-06-15" }),
    );
    let mut seen = 0;
    for week in month["weeks"].as_array().expect("weeks") {
        for cell in week.as_array().expect("cells") {
            if let Some(lessons) = cell.get("lessons").and_then(|v| v.as_array()) {
                seen += lessons.len();
            }
        }
    }
    assert_eq!(seen, 1);

    // Operations against the deleted student now miss.
    let resp = request(
        &mut stdin,
        &mut reader,
        "11",
        "students.update",
        json!({
            "teacherId": teacher_id,
            "studentId": doomed_id,
            "patch": { "name": "Back" }
        }),
    );
    assert_eq!(
        resp["error"]["code"].as_str(),
        Some("not_found"),
        "{}",
        resp
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
