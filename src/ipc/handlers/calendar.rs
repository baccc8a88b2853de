use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use serde_json::json;

use crate::calendar::{month_bounds, month_grid, shift_cursor, week_start, Direction, ViewMode};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_date, required_str};
use crate::ipc::types::{AppState, Request};

use super::students::teacher_exists;

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Flattened lessons for the range, annotated with the owning student,
/// bucketed by calendar date. Ordering inside a bucket is time ascending
/// with the student name as a tiebreak.
fn load_day_buckets(
    conn: &Connection,
    teacher_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> rusqlite::Result<HashMap<String, Vec<serde_json::Value>>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.student_id, s.name, l.date, l.time, l.duration_minutes, l.value, l.status
         FROM lessons l
         JOIN students s ON s.id = l.student_id
         WHERE s.teacher_id = ? AND l.date >= ? AND l.date <= ?
         ORDER BY l.date, l.time, s.name",
    )?;
    let rows = stmt
        .query_map((teacher_id, iso(from), iso(to)), |r| {
            let date: String = r.get(3)?;
            let lesson = json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "studentName": r.get::<_, String>(2)?,
                "date": date,
                "time": r.get::<_, String>(4)?,
                "durationMinutes": r.get::<_, i64>(5)?,
                "value": r.get::<_, f64>(6)?,
                "status": r.get::<_, String>(7)?,
            });
            Ok((date, lesson))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut buckets: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    for (date, lesson) in rows {
        buckets.entry(date).or_default().push(lesson);
    }
    Ok(buckets)
}

fn day_cell(buckets: &HashMap<String, Vec<serde_json::Value>>, date: NaiveDate) -> serde_json::Value {
    let key = iso(date);
    let lessons = buckets.get(&key).cloned().unwrap_or_default();
    json!({ "date": key, "lessons": lessons })
}

fn handle_calendar_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let mode = match required_str(req, "mode") {
        Ok(raw) => match ViewMode::parse(&raw) {
            Some(m) => m,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "mode must be one of: month, week, day",
                    None,
                )
            }
        },
        Err(resp) => return resp,
    };
    let cursor = match required_date(req, "cursor") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match teacher_exists(conn, &teacher_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "teacher not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    match mode {
        ViewMode::Month => {
            let (first, last) = month_bounds(cursor);
            let buckets = match load_day_buckets(conn, &teacher_id, first, last) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            let weeks: Vec<serde_json::Value> = month_grid(cursor)
                .iter()
                .map(|week| {
                    let cells: Vec<serde_json::Value> = week
                        .iter()
                        .map(|cell| match cell {
                            None => serde_json::Value::Null,
                            Some(date) => day_cell(&buckets, *date),
                        })
                        .collect();
                    json!(cells)
                })
                .collect();
            ok(
                &req.id,
                json!({
                    "mode": mode.as_str(),
                    "cursor": iso(cursor),
                    "month": cursor.format("%Y-%m").to_string(),
                    "weeks": weeks,
                }),
            )
        }
        ViewMode::Week => {
            let start = week_start(cursor);
            let end = start.checked_add_days(Days::new(6)).unwrap_or(start);
            let buckets = match load_day_buckets(conn, &teacher_id, start, end) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            let days: Vec<serde_json::Value> = (0..7)
                .filter_map(|offset| start.checked_add_days(Days::new(offset)))
                .map(|date| day_cell(&buckets, date))
                .collect();
            ok(
                &req.id,
                json!({
                    "mode": mode.as_str(),
                    "cursor": iso(cursor),
                    "start": iso(start),
                    "end": iso(end),
                    "days": days,
                }),
            )
        }
        ViewMode::Day => {
            let buckets = match load_day_buckets(conn, &teacher_id, cursor, cursor) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            let lessons = buckets.get(&iso(cursor)).cloned().unwrap_or_default();
            ok(
                &req.id,
                json!({
                    "mode": mode.as_str(),
                    "cursor": iso(cursor),
                    "date": iso(cursor),
                    "lessons": lessons,
                }),
            )
        }
    }
}

// Pure date math; works without a workspace.
fn handle_calendar_shift(req: &Request) -> serde_json::Value {
    let mode = match required_str(req, "mode") {
        Ok(raw) => match ViewMode::parse(&raw) {
            Some(m) => m,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "mode must be one of: month, week, day",
                    None,
                )
            }
        },
        Err(resp) => return resp,
    };
    let cursor = match required_date(req, "cursor") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let direction = match required_str(req, "direction") {
        Ok(raw) => match Direction::parse(&raw) {
            Some(d) => d,
            None => return err(&req.id, "bad_params", "direction must be prev or next", None),
        },
        Err(resp) => return resp,
    };

    let shifted = shift_cursor(mode, cursor, direction);
    ok(&req.id, json!({ "cursor": iso(shifted) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendar.view" => Some(handle_calendar_view(state, req)),
        "calendar.shift" => Some(handle_calendar_shift(req)),
        _ => None,
    }
}
