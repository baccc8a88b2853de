use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, parse_opt_f64, parse_opt_i64, required_date, required_str};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{self, BatchError};
use crate::status::{self, LessonStatus};

fn student_lesson_value(
    conn: &Connection,
    teacher_id: &str,
    student_id: &str,
) -> rusqlite::Result<Option<f64>> {
    conn.query_row(
        "SELECT lesson_value FROM students WHERE teacher_id = ? AND id = ?",
        (teacher_id, student_id),
        |r| r.get(0),
    )
    .optional()
}

fn lesson_status(
    conn: &Connection,
    teacher_id: &str,
    student_id: &str,
    lesson_id: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT l.status
         FROM lessons l
         JOIN students s ON s.id = l.student_id
         WHERE s.teacher_id = ? AND l.student_id = ? AND l.id = ?",
        (teacher_id, student_id, lesson_id),
        |r| r.get(0),
    )
    .optional()
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let default_value = match student_lesson_value(conn, &teacher_id, &student_id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let date = match required_date(req, "date") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let time_raw = match required_str(req, "time") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(time) = schedule::normalize_time(&time_raw) else {
        return err(
            &req.id,
            "invalid_time",
            BatchError::InvalidTime.message(),
            None,
        );
    };
    let duration = match parse_opt_i64(req.params.get("durationMinutes")) {
        Ok(v) => v.unwrap_or(60),
        Err(msg) => {
            return err(&req.id, "bad_params", format!("durationMinutes {}", msg), None)
        }
    };
    if duration <= 0 {
        return err(
            &req.id,
            "invalid_duration",
            BatchError::InvalidDuration.message(),
            None,
        );
    }
    let value = match parse_opt_f64(req.params.get("value")) {
        Ok(v) => v.unwrap_or(default_value),
        Err(msg) => return err(&req.id, "bad_params", format!("value {}", msg), None),
    };
    if value < 0.0 {
        return err(&req.id, "bad_params", "value must be >= 0", None);
    }
    let status = match req.params.get("status").and_then(|v| v.as_str()) {
        None => LessonStatus::Pending,
        Some(raw) => match LessonStatus::parse(raw) {
            Some(s) => s,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "status must be one of: pending, completed, paid, absent",
                    None,
                )
            }
        },
    };

    let lesson_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO lessons(id, student_id, date, time, duration_minutes, value, status)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &lesson_id,
            &student_id,
            date.format("%Y-%m-%d").to_string(),
            &time,
            duration,
            value,
            status.as_str(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }

    ok(&req.id, json!({ "lessonId": lesson_id }))
}

fn handle_lessons_update(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match lesson_status(conn, &teacher_id, &student_id, &lesson_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "lesson not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    if patch.contains_key("status") {
        return err(
            &req.id,
            "bad_params",
            "status changes must go through lessons.setStatus",
            None,
        );
    }

    let mut sets: Vec<&'static str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    for (key, value) in patch {
        match key.as_str() {
            "date" => {
                let parsed = value
                    .as_str()
                    .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());
                let Some(date) = parsed else {
                    return err(&req.id, "bad_params", "date must be YYYY-MM-DD", None);
                };
                sets.push("date = ?");
                args.push(Value::Text(date.format("%Y-%m-%d").to_string()));
            }
            "time" => {
                let Some(time) = value.as_str().and_then(schedule::normalize_time) else {
                    return err(
                        &req.id,
                        "invalid_time",
                        BatchError::InvalidTime.message(),
                        None,
                    );
                };
                sets.push("time = ?");
                args.push(Value::Text(time));
            }
            "durationMinutes" => {
                let Some(duration) = value.as_i64().filter(|v| *v > 0) else {
                    return err(
                        &req.id,
                        "invalid_duration",
                        BatchError::InvalidDuration.message(),
                        None,
                    );
                };
                sets.push("duration_minutes = ?");
                args.push(Value::Integer(duration));
            }
            "value" => {
                let Some(v) = value.as_f64().filter(|v| *v >= 0.0) else {
                    return err(&req.id, "bad_params", "value must be >= 0", None);
                };
                sets.push("value = ?");
                args.push(Value::Real(v));
            }
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

    let sql = format!("UPDATE lessons SET {} WHERE id = ?", sets.join(", "));
    args.push(Value::Text(lesson_id.clone()));
    if let Err(e) = conn.execute(&sql, params_from_iter(args)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_lessons_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let target = match required_str(req, "status") {
        Ok(raw) => match LessonStatus::parse(&raw) {
            Some(s) => s,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "status must be one of: pending, completed, paid, absent",
                    None,
                )
            }
        },
        Err(resp) => return resp,
    };

    // The precondition check and the write share one transaction, and the
    // update compares against the status that was read, so a concurrent
    // writer cannot slip a forbidden transition through.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let current_raw = match lesson_status(&tx, &teacher_id, &student_id, &lesson_id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "lesson not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let current = LessonStatus::parse(&current_raw).unwrap_or(LessonStatus::Pending);

    if let Err(reason) = status::check_transition(current, target) {
        return err(&req.id, "invalid_transition", reason, None);
    }

    let changed = match tx.execute(
        "UPDATE lessons SET status = ? WHERE id = ? AND status = ?",
        (target.as_str(), &lesson_id, &current_raw),
    ) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "lessons" })),
            )
        }
    };
    if changed == 0 {
        return err(
            &req.id,
            "conflict",
            "lesson status changed concurrently; retry",
            None,
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "lessonId": lesson_id, "status": target.as_str() }),
    )
}

fn handle_lessons_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match lesson_status(conn, &teacher_id, &student_id, &lesson_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "lesson not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    if let Err(e) = conn.execute("DELETE FROM lessons WHERE id = ?", [&lesson_id]) {
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_lessons_batch_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    // The batch carries the student's current lesson value, not a
    // caller-supplied one.
    let lesson_value = match student_lesson_value(conn, &teacher_id, &student_id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let start = match required_date(req, "startDate") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let end = match required_date(req, "endDate") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let time = match required_str(req, "time") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    // A missing or non-numeric duration falls through to the positivity check.
    let duration = req
        .params
        .get("durationMinutes")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let Some(weekdays_raw) = req.params.get("weekdays").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing weekdays", None);
    };
    let mut weekdays: Vec<u32> = Vec::with_capacity(weekdays_raw.len());
    for v in weekdays_raw {
        match v.as_u64() {
            Some(d) if d <= 6 => {
                let d = d as u32;
                if !weekdays.contains(&d) {
                    weekdays.push(d);
                }
            }
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    "weekdays must be integers 0 (Sunday) through 6 (Saturday)",
                    None,
                )
            }
        }
    }
    if weekdays.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "weekdays must contain at least one weekday",
            None,
        );
    }

    let drafts = match schedule::expand_batch(start, end, &time, duration, &weekdays, lesson_value)
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, e.code(), e.message(), None),
    };

    // All generated lessons go in as one transaction; the batch either fully
    // succeeds or writes nothing.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let mut lesson_ids = Vec::with_capacity(drafts.len());
    for draft in &drafts {
        let lesson_id = Uuid::new_v4().to_string();
        if let Err(e) = tx.execute(
            "INSERT INTO lessons(id, student_id, date, time, duration_minutes, value, status)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &lesson_id,
                &student_id,
                draft.date.format("%Y-%m-%d").to_string(),
                &draft.time,
                draft.duration_minutes,
                draft.value,
                LessonStatus::Pending.as_str(),
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "lessons" })),
            );
        }
        lesson_ids.push(lesson_id);
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "created": lesson_ids.len(), "lessonIds": lesson_ids }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lessons.create" => Some(handle_lessons_create(state, req)),
        "lessons.update" => Some(handle_lessons_update(state, req)),
        "lessons.setStatus" => Some(handle_lessons_set_status(state, req)),
        "lessons.delete" => Some(handle_lessons_delete(state, req)),
        "lessons.batchCreate" => Some(handle_lessons_batch_create(state, req)),
        _ => None,
    }
}
