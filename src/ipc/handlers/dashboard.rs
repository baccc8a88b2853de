use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::metrics::{self, LessonRecord, StudentRecord};

use super::students::teacher_exists;

fn load_students(conn: &Connection, teacher_id: &str) -> rusqlite::Result<Vec<StudentRecord>> {
    let mut students_stmt = conn.prepare(
        "SELECT id, name, payment_day FROM students WHERE teacher_id = ? ORDER BY name",
    )?;
    let base = students_stmt
        .query_map([teacher_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<i64>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut lessons_stmt =
        conn.prepare("SELECT id, date, value, status FROM lessons WHERE student_id = ?")?;

    let mut out = Vec::with_capacity(base.len());
    for (id, name, payment_day) in base {
        let lessons = lessons_stmt
            .query_map([&id], |r| {
                Ok(LessonRecord {
                    id: r.get(0)?,
                    date: r.get(1)?,
                    value: r.get(2)?,
                    status: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        out.push(StudentRecord {
            name,
            payment_day,
            lessons,
        });
    }
    Ok(out)
}

fn handle_dashboard_metrics(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    // `today` overrides the clock for deterministic queries.
    let today = match req.params.get("today").and_then(|v| v.as_str()) {
        Some(raw) => match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => return err(&req.id, "bad_params", "today must be YYYY-MM-DD", None),
        },
        None => Local::now().date_naive(),
    };

    let students = match load_students(conn, &teacher_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let totals = metrics::dashboard_metrics(&students, today);
    ok(
        &req.id,
        serde_json::to_value(&totals).unwrap_or_else(|_| json!({})),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.metrics" => Some(handle_dashboard_metrics(state, req)),
        _ => None,
    }
}
