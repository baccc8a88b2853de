use std::collections::HashSet;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Teacher ids with a live `teachers.subscribe` registration.
    pub subscriptions: HashSet<String>,
    /// Change events queued while handling a request; the main loop flushes
    /// them after the response line.
    pub pending_events: Vec<serde_json::Value>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            subscriptions: HashSet::new(),
            pending_events: Vec::new(),
        }
    }

    pub fn drain_events(&mut self) -> Vec<serde_json::Value> {
        std::mem::take(&mut self.pending_events)
    }
}
