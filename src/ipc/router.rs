use serde_json::json;

use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

const MUTATING_METHODS: &[&str] = &[
    "students.create",
    "students.update",
    "students.delete",
    "lessons.create",
    "lessons.update",
    "lessons.setStatus",
    "lessons.delete",
    "lessons.batchCreate",
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let resp = dispatch(state, &req);
    queue_change_event(state, &req, &resp);
    resp
}

fn dispatch(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::teachers::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::lessons::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::dashboard::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::calendar::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

/// One subtree listener per teacher: every successful write against a
/// subscribed teacher queues a fresh full snapshot, from which the client
/// derives its dashboard/calendar/list state.
fn queue_change_event(state: &mut AppState, req: &Request, resp: &serde_json::Value) {
    if resp.get("ok").and_then(|v| v.as_bool()) != Some(true) {
        return;
    }
    if !MUTATING_METHODS.contains(&req.method.as_str()) {
        return;
    }
    let Some(teacher_id) = req.params.get("teacherId").and_then(|v| v.as_str()) else {
        return;
    };
    if !state.subscriptions.contains(teacher_id) {
        return;
    }

    let snapshot = match state.db.as_ref() {
        Some(conn) => handlers::teachers::teacher_snapshot(conn, teacher_id),
        None => return,
    };
    match snapshot {
        Ok(Some(teacher)) => state.pending_events.push(json!({
            "event": "teacher.changed",
            "teacherId": teacher_id,
            "teacher": teacher,
        })),
        Ok(None) => {}
        Err(e) => log::warn!("change snapshot for teacher {} failed: {}", teacher_id, e),
    }
}
