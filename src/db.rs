//! Database module
//!
//! Provides durable storage for the active thread and its messages.

mod schema;

pub use schema::*;

use crate::model::{Message, MessageOrigin, Role, Thread, ThreadMetadata};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Replace everything stored with `state`
    pub fn save_state(&self, state: &PersistedState) -> DbResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM messages", [])?;
        tx.execute("DELETE FROM active_thread", [])?;

        if let Some(thread) = &state.thread {
            tx.execute(
                "INSERT INTO active_thread (slot, thread_id, title, summary, saved_at)
                 VALUES (0, ?1, ?2, ?3, ?4)",
                params![
                    thread.id,
                    thread.metadata.title,
                    thread.metadata.summary,
                    state.saved_at.to_rfc3339()
                ],
            )?;

            let mut stmt = tx.prepare(
                "INSERT INTO messages (thread_id, position, message_id, role, content, origin, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (position, msg) in thread.messages().iter().enumerate() {
                stmt.execute(params![
                    thread.id,
                    i64::try_from(position).map_err(|e| DbError::Corrupt(e.to_string()))?,
                    msg.id,
                    msg.role.as_str(),
                    msg.content,
                    origin_str(msg.origin),
                    msg.created_at.to_rfc3339()
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Load the stored state, `None` if nothing was ever saved
    pub fn load_state(&self) -> DbResult<Option<PersistedState>> {
        let conn = self.lock()?;

        let header = conn
            .query_row(
                "SELECT thread_id, title, summary, saved_at FROM active_thread WHERE slot = 0",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((thread_id, title, summary, saved_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT message_id, role, content, origin, created_at
             FROM messages WHERE thread_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![thread_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, role, content, origin, created_at) = row?;
            let role = Role::parse(&role)
                .ok_or_else(|| DbError::Corrupt(format!("unknown role `{role}` on {id}")))?;
            messages.push(Message {
                id,
                role,
                content,
                created_at: parse_datetime(&created_at)?,
                origin: parse_origin(&origin),
            });
        }

        let thread = Thread::with_messages(thread_id, messages)
            .with_metadata(ThreadMetadata { title, summary });

        Ok(Some(PersistedState {
            thread: Some(thread),
            saved_at: parse_datetime(&saved_at)?,
        }))
    }

    /// Remove all stored state
    pub fn clear(&self) -> DbResult<()> {
        self.save_state(&PersistedState::empty())
    }
}

fn origin_str(origin: MessageOrigin) -> &'static str {
    match origin {
        MessageOrigin::Local => "local",
        MessageOrigin::Server => "server",
    }
}

fn parse_origin(s: &str) -> MessageOrigin {
    match s {
        "local" => MessageOrigin::Local,
        _ => MessageOrigin::Server,
    }
}

fn parse_datetime(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("bad timestamp `{s}`: {e}")))
}
