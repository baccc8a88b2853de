use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};

/// Full `teacher -> students -> lessons` snapshot, students ordered by name
/// and lessons by date then time. `None` when the teacher does not exist.
pub fn teacher_snapshot(
    conn: &Connection,
    teacher_id: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let teacher = conn
        .query_row(
            "SELECT id, name, email FROM teachers WHERE id = ?",
            [teacher_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((id, name, email)) = teacher else {
        return Ok(None);
    };

    let mut students_stmt = conn.prepare(
        "SELECT id, name, student_email, lesson_link, lesson_value, payment_day
         FROM students
         WHERE teacher_id = ?
         ORDER BY name",
    )?;
    let students = students_stmt
        .query_map([teacher_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, f64>(4)?,
                r.get::<_, Option<i64>>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut lessons_stmt = conn.prepare(
        "SELECT id, date, time, duration_minutes, value, status
         FROM lessons
         WHERE student_id = ?
         ORDER BY date, time",
    )?;

    let mut students_json = Vec::with_capacity(students.len());
    for (sid, sname, student_email, lesson_link, lesson_value, payment_day) in students {
        let lessons = lessons_stmt
            .query_map([&sid], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "date": r.get::<_, String>(1)?,
                    "time": r.get::<_, String>(2)?,
                    "durationMinutes": r.get::<_, i64>(3)?,
                    "value": r.get::<_, f64>(4)?,
                    "status": r.get::<_, String>(5)?,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        students_json.push(json!({
            "id": sid,
            "name": sname,
            "studentEmail": student_email,
            "lessonLink": lesson_link,
            "lessonValue": lesson_value,
            "paymentDay": payment_day,
            "lessons": lessons,
        }));
    }

    Ok(Some(json!({
        "id": id,
        "name": name,
        "email": email,
        "students": students_json,
    })))
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v.to_lowercase(),
        Err(resp) => return resp,
    };

    let teacher_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO teachers(id, name, email) VALUES(?, ?, ?)",
        (&teacher_id, &name, &email),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }

    ok(
        &req.id,
        json!({ "teacherId": teacher_id, "name": name, "email": email }),
    )
}

fn handle_teachers_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match teacher_snapshot(conn, &teacher_id) {
        Ok(Some(teacher)) => ok(&req.id, json!({ "teacher": teacher })),
        Ok(None) => err(&req.id, "not_found", "teacher not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_teachers_subscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let snapshot = match state.db.as_ref() {
        Some(conn) => teacher_snapshot(conn, &teacher_id),
        None => return err(&req.id, "no_workspace", "select a workspace first", None),
    };

    match snapshot {
        Ok(Some(teacher)) => {
            state.subscriptions.insert(teacher_id.clone());
            ok(
                &req.id,
                json!({ "teacherId": teacher_id, "teacher": teacher }),
            )
        }
        Ok(None) => err(&req.id, "not_found", "teacher not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_teachers_unsubscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let removed = state.subscriptions.remove(&teacher_id);
    ok(
        &req.id,
        json!({ "teacherId": teacher_id, "removed": removed }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.get" => Some(handle_teachers_get(state, req)),
        "teachers.subscribe" => Some(handle_teachers_subscribe(state, req)),
        "teachers.unsubscribe" => Some(handle_teachers_unsubscribe(state, req)),
        _ => None,
    }
}
