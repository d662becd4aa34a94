//! Database schema and persisted types

use crate::model::Thread;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS active_thread (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    thread_id TEXT NOT NULL,
    title TEXT,
    summary TEXT,
    saved_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    thread_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    message_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    origin TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (thread_id, position)
);
";

/// The engine state that survives a restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub thread: Option<Thread>,
    pub saved_at: DateTime<Utc>,
}

impl PersistedState {
    pub fn new(thread: Option<Thread>) -> Self {
        Self {
            thread,
            saved_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(None)
    }
}
