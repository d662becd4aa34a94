//! Persistence abstraction for the engine
//!
//! Lets the engine be tested against an in-memory store.

use crate::db::{Database, PersistedState};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable storage for the engine's serializable state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last saved state, `None` on first run
    async fn load(&self) -> Result<Option<PersistedState>, String>;

    /// Replace the saved state
    async fn save(&self, state: &PersistedState) -> Result<(), String>;
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn load(&self) -> Result<Option<PersistedState>, String> {
        (**self).load().await
    }

    async fn save(&self, state: &PersistedState) -> Result<(), String> {
        (**self).save(state).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `StateStore`
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StateStore for DatabaseStore {
    async fn load(&self) -> Result<Option<PersistedState>, String> {
        self.db.load_state().map_err(|e| e.to_string())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), String> {
        self.db.save_state(state).map_err(|e| e.to_string())
    }
}
