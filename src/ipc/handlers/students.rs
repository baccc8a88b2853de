use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, parse_opt_f64, parse_opt_i64, parse_opt_string, required_str};
use crate::ipc::types::{AppState, Request};

pub(super) fn teacher_exists(conn: &Connection, teacher_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

pub(super) fn student_exists(
    conn: &Connection,
    teacher_id: &str,
    student_id: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM students WHERE teacher_id = ? AND id = ?",
        (teacher_id, student_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match teacher_exists(conn, &teacher_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "teacher not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let student_email = match parse_opt_string(req.params.get("studentEmail")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", format!("studentEmail {}", msg), None),
    };
    let lesson_link = match parse_opt_string(req.params.get("lessonLink")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", format!("lessonLink {}", msg), None),
    };
    let lesson_value = match parse_opt_f64(req.params.get("lessonValue")) {
        Ok(v) => v.unwrap_or(0.0),
        Err(msg) => return err(&req.id, "bad_params", format!("lessonValue {}", msg), None),
    };
    if lesson_value < 0.0 {
        return err(&req.id, "bad_params", "lessonValue must be >= 0", None);
    }
    let payment_day = match parse_opt_i64(req.params.get("paymentDay")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", format!("paymentDay {}", msg), None),
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, teacher_id, name, student_email, lesson_link, lesson_value, payment_day)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &teacher_id,
            &name,
            &student_email,
            &lesson_link,
            lesson_value,
            payment_day,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match student_exists(conn, &teacher_id, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    // Field merge: only the named fields change.
    let mut sets: Vec<&'static str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    for (key, value) in patch {
        match key.as_str() {
            "name" => {
                let Some(name) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "name must be a non-empty string", None);
                };
                sets.push("name = ?");
                args.push(Value::Text(name.to_string()));
            }
            "studentEmail" => match parse_opt_string(Some(value)) {
                Ok(Some(v)) => {
                    sets.push("student_email = ?");
                    args.push(Value::Text(v));
                }
                Ok(None) => {
                    sets.push("student_email = ?");
                    args.push(Value::Null);
                }
                Err(msg) => {
                    return err(&req.id, "bad_params", format!("studentEmail {}", msg), None)
                }
            },
            "lessonLink" => match parse_opt_string(Some(value)) {
                Ok(Some(v)) => {
                    sets.push("lesson_link = ?");
                    args.push(Value::Text(v));
                }
                Ok(None) => {
                    sets.push("lesson_link = ?");
                    args.push(Value::Null);
                }
                Err(msg) => return err(&req.id, "bad_params", format!("lessonLink {}", msg), None),
            },
            "lessonValue" => match parse_opt_f64(Some(value)) {
                Ok(Some(v)) if v >= 0.0 => {
                    sets.push("lesson_value = ?");
                    args.push(Value::Real(v));
                }
                Ok(_) => return err(&req.id, "bad_params", "lessonValue must be >= 0", None),
                Err(msg) => {
                    return err(&req.id, "bad_params", format!("lessonValue {}", msg), None)
                }
            },
            "paymentDay" => match parse_opt_i64(Some(value)) {
                Ok(Some(v)) => {
                    sets.push("payment_day = ?");
                    args.push(Value::Integer(v));
                }
                Ok(None) => {
                    sets.push("payment_day = ?");
                    args.push(Value::Null);
                }
                Err(msg) => return err(&req.id, "bad_params", format!("paymentDay {}", msg), None),
            },
            other => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown patch field: {}", other),
                    None,
                )
            }
        }
    }

    if sets.is_empty() {
        return err(&req.id, "bad_params", "patch must name at least one field", None);
    }

    let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
    args.push(Value::Text(student_id.clone()));
    if let Err(e) = conn.execute(&sql, params_from_iter(args)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match student_exists(conn, &teacher_id, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Deleting a student cascades to all of their lessons.
    if let Err(e) = tx.execute("DELETE FROM lessons WHERE student_id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match teacher_exists(conn, &teacher_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "teacher not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut stmt = match conn.prepare(
        "SELECT
           s.id,
           s.name,
           s.student_email,
           s.lesson_link,
           s.lesson_value,
           s.payment_day,
           (SELECT COUNT(*) FROM lessons l WHERE l.student_id = s.id) AS lesson_count
         FROM students s
         WHERE s.teacher_id = ?
         ORDER BY s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&teacher_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "studentEmail": r.get::<_, Option<String>>(2)?,
                "lessonLink": r.get::<_, Option<String>>(3)?,
                "lessonValue": r.get::<_, f64>(4)?,
                "paymentDay": r.get::<_, Option<i64>>(5)?,
                "lessonCount": r.get::<_, i64>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
