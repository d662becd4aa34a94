//! Thread synchronization engine
//!
//! Owns the active thread, creates it lazily on the server, and applies
//! sends optimistically with confirm-or-rollback. A thread the server no
//! longer recognizes is recreated and the send retried once.

mod state;
pub mod traits;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use state::EngineSnapshot;
pub use traits::*;

use crate::db::PersistedState;
use crate::model::{Message, Thread};
use crate::transport::{SendRequest, ThreadError, ThreadTransport};
use futures::FutureExt;
use state::{CreationGuard, EngineState, LoadingGuard, PendingCreation, SendGuard, StateCell};
use std::sync::Arc;
use tokio::sync::watch;

/// First attempt plus one retry after recreating a lost thread
const MAX_SEND_ATTEMPTS: u32 = 2;

/// Result of a `send_message` call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Server confirmed the message and replied
    Sent { user: Message, assistant: Message },
    /// Nothing was sent
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Text was empty after trimming
    EmptyText,
    /// Another send is still outstanding
    SendInProgress,
}

struct EngineCore<T, S> {
    transport: T,
    store: S,
    cell: Arc<StateCell>,
    /// Held across read-and-save so the last save always carries the newest state
    save_lock: tokio::sync::Mutex<()>,
}

impl<T, S> EngineCore<T, S>
where
    T: ThreadTransport + 'static,
    S: StateStore + 'static,
{
    /// Save the current thread. Failures only cost durability.
    async fn persist(&self) {
        let _saving = self.save_lock.lock().await;
        let state = PersistedState::new(self.cell.read(|s| s.thread.clone()));
        if let Err(e) = self.store.save(&state).await {
            tracing::warn!(
                error = %e,
                "Failed to persist conversation; it may not survive a restart"
            );
        }
    }

    async fn create(&self, generation: u64) -> Result<String, ThreadError> {
        let result = self.transport.create_thread().await;

        let current = self.cell.update(|s| {
            if s.generation != generation {
                return false;
            }
            match &result {
                Ok(created) => {
                    s.thread = Some(Thread::new(created.id.clone()));
                    s.error = None;
                }
                Err(e) => s.error = Some(e.message.clone()),
            }
            true
        });

        match &result {
            Ok(created) if current => {
                tracing::info!(thread_id = %created.id, "Thread created");
            }
            Ok(created) => {
                tracing::debug!(
                    thread_id = %created.id,
                    "Discarding thread created for a replaced conversation"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = e.kind.as_str(), "Thread creation failed");
            }
        }

        if current {
            self.persist().await;
        }
        result.map(|created| created.id)
    }
}

/// The synchronization engine for one conversation.
///
/// Cloning is cheap; clones share the same state. All methods must be called
/// from within a tokio runtime.
pub struct ThreadEngine<T, S> {
    core: Arc<EngineCore<T, S>>,
}

impl<T, S> Clone for ThreadEngine<T, S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T, S> ThreadEngine<T, S>
where
    T: ThreadTransport + 'static,
    S: StateStore + 'static,
{
    /// Engine with no thread
    pub fn new(transport: T, store: S) -> Self {
        Self {
            core: Arc::new(EngineCore {
                transport,
                store,
                cell: Arc::new(StateCell::new()),
                save_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Engine seeded from the store. Makes no network call; a restored thread
    /// is trusted until a send proves otherwise.
    pub async fn restore(transport: T, store: S) -> Self {
        let engine = Self::new(transport, store);
        match engine.core.store.load().await {
            Ok(Some(PersistedState {
                thread: Some(thread),
                saved_at,
            })) => {
                tracing::info!(
                    thread_id = %thread.id,
                    messages = thread.messages().len(),
                    saved_at = %saved_at,
                    "Restored conversation"
                );
                engine.core.cell.update(|s| s.thread = Some(thread));
            }
            Ok(_) => tracing::debug!("No saved conversation"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load saved conversation, starting empty");
            }
        }
        engine
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.core.cell.read(EngineState::snapshot)
    }

    /// Receive a new snapshot after every state change
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.core.cell.subscribe()
    }

    pub fn thread(&self) -> Option<Thread> {
        self.core.cell.read(|s| s.thread.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.core.cell.read(|s| s.loading > 0)
    }

    pub fn error(&self) -> Option<String> {
        self.core.cell.read(|s| s.error.clone())
    }

    pub fn is_sending(&self) -> bool {
        self.core.cell.read(|s| s.send_token.is_some())
    }

    /// Id of the active thread, creating it on the server if needed.
    ///
    /// Concurrent callers share one creation request.
    pub async fn ensure_thread(&self) -> Result<String, ThreadError> {
        let pending = {
            let mut state = self.core.cell.lock();
            if let Some(thread) = &state.thread {
                return Ok(thread.id.clone());
            }
            let in_flight = state.creating.clone();
            if let Some(pending) = in_flight {
                pending
            } else {
                let pending = self.start_creation(&mut state);
                self.core.cell.publish(&state);
                pending
            }
        };
        pending.await
    }

    /// Spawn the creation task and install it in the in-flight slot.
    ///
    /// The task runs to completion even if every caller stops awaiting it;
    /// its guard releases the slot and the loading flag when it ends.
    fn start_creation(&self, state: &mut EngineState) -> PendingCreation {
        let generation = state.generation;
        state.loading += 1;
        let guard = CreationGuard::new(Arc::clone(&self.core.cell), generation);
        let core = Arc::clone(&self.core);

        tracing::debug!(generation, "Creating thread");
        let task = tokio::spawn(async move {
            let _guard = guard;
            core.create(generation).await
        });

        let cell = Arc::clone(&self.core.cell);
        let pending = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let err = ThreadError::transport(format!("Thread creation aborted: {e}"));
                    tracing::error!(error = %e, generation, "Thread creation task failed");
                    cell.update(|s| {
                        if s.generation == generation {
                            s.error = Some(err.message.clone());
                        }
                    });
                    Err(err)
                }
            }
        }
        .boxed()
        .shared();

        state.creating = Some(pending.clone());
        pending
    }

    /// Send `text` to the active thread.
    ///
    /// The user message is visible before the server answers. On failure it
    /// is rolled back and the error recorded; a lost thread is recreated and
    /// the send retried once.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, ThreadError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Skipped(SkipReason::EmptyText));
        }
        let Some(sending) = SendGuard::claim(&self.core.cell) else {
            tracing::debug!("Send already in progress, ignoring");
            return Ok(SendOutcome::Skipped(SkipReason::SendInProgress));
        };

        let mut generation = sending.generation();
        let mut attempt = 1;
        loop {
            match self.send_attempt(text, attempt, generation).await {
                Err(e) if e.kind.is_recoverable() && attempt < MAX_SEND_ATTEMPTS => {
                    if !sending.is_current(generation) {
                        tracing::debug!(
                            error = %e,
                            "Conversation replaced during send, not recreating thread"
                        );
                        return Err(e);
                    }
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "Thread no longer exists on the server, starting a new one"
                    );
                    let (started, pending) = self.replace_thread();
                    pending.await?;
                    if !sending.is_current(started) {
                        tracing::debug!("Conversation replaced during recovery, not resending");
                        return Err(e);
                    }
                    generation = started;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn send_attempt(
        &self,
        text: &str,
        attempt: u32,
        generation: u64,
    ) -> Result<SendOutcome, ThreadError> {
        self.ensure_thread().await?;

        // Snapshot and optimistic publish happen under one lock so the
        // rollback target is never itself optimistic.
        let (snapshot, user) = {
            let mut state = self.core.cell.lock();
            let snapshot = match &state.thread {
                Some(thread) if state.generation == generation => thread.clone(),
                _ => {
                    return Err(ThreadError::transport(
                        "Conversation was replaced before the message was sent",
                    ));
                }
            };
            let user = Message::local_user(text);
            state.thread = Some(snapshot.appended(user.clone()));
            self.core.cell.publish(&state);
            (snapshot, user)
        };
        let thread_id = snapshot.id.clone();
        tracing::debug!(
            thread_id = %thread_id,
            message_id = %user.id,
            attempt,
            "Appended optimistic message"
        );

        let request = SendRequest {
            thread_id: thread_id.clone(),
            text: text.to_string(),
        };

        match self.core.transport.send_message(&request).await {
            Ok(reply) => {
                let assistant = reply.assistant_message;
                let applied = self.core.cell.update(|s| match &s.thread {
                    Some(current) if current.id == thread_id => {
                        s.thread = Some(current.appended(assistant.clone()));
                        s.error = None;
                        true
                    }
                    _ => false,
                });
                if applied {
                    self.core.persist().await;
                } else {
                    tracing::debug!(
                        thread_id = %thread_id,
                        "Conversation replaced during send, dropping reply"
                    );
                }
                Ok(SendOutcome::Sent { user, assistant })
            }
            Err(e) => {
                let will_retry = e.kind.is_recoverable() && attempt < MAX_SEND_ATTEMPTS;
                let rolled_back = self.core.cell.update(|s| {
                    if s.generation != generation || !s.thread_is(&thread_id) {
                        return false;
                    }
                    s.thread = Some(snapshot);
                    if !will_retry {
                        s.error = Some(e.message.clone());
                    }
                    true
                });
                if rolled_back {
                    tracing::info!(
                        thread_id = %thread_id,
                        kind = e.kind.as_str(),
                        attempt,
                        "Send failed, rolled back optimistic message"
                    );
                    self.core.persist().await;
                } else {
                    tracing::debug!(
                        thread_id = %thread_id,
                        kind = e.kind.as_str(),
                        "Send failed after the conversation was replaced"
                    );
                }
                Err(e)
            }
        }
    }

    /// Discard the current thread and create a fresh one.
    ///
    /// The old thread is not deleted on the server.
    pub async fn new_chat(&self) -> Result<String, ThreadError> {
        let (_, pending) = self.replace_thread();
        pending.await
    }

    /// Start a new generation with a fresh creation in flight
    fn replace_thread(&self) -> (u64, PendingCreation) {
        let mut state = self.core.cell.lock();
        state.supersede();
        if let Some(old) = state.thread.take() {
            tracing::info!(thread_id = %old.id, "Discarding thread for a new chat");
        }
        let pending = self.start_creation(&mut state);
        self.core.cell.publish(&state);
        (state.generation, pending)
    }

    /// Replace local state with the server's copy of the thread.
    ///
    /// Without a thread this only establishes one.
    pub async fn reload_thread(&self) -> Result<Thread, ThreadError> {
        let current = self.core.cell.read(|s| s.thread.as_ref().map(|t| t.id.clone()));
        let Some(thread_id) = current else {
            self.ensure_thread().await?;
            return self
                .thread()
                .ok_or_else(|| ThreadError::transport("Conversation was reset while loading"));
        };

        let _loading = LoadingGuard::begin(&self.core.cell);
        match self.core.transport.get_thread(&thread_id).await {
            Ok(thread) => {
                let applied = self.core.cell.update(|s| {
                    if !s.thread_is(&thread_id) {
                        return false;
                    }
                    s.thread = Some(thread.clone());
                    s.error = None;
                    true
                });
                if applied {
                    tracing::info!(
                        thread_id = %thread_id,
                        messages = thread.messages().len(),
                        "Thread reloaded"
                    );
                    self.core.persist().await;
                }
                Ok(thread)
            }
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, error = %e, "Thread reload failed");
                self.core.cell.update(|s| s.error = Some(e.message.clone()));
                Err(e)
            }
        }
    }

    /// Forget everything, e.g. on logout. Makes no network call.
    pub async fn reset(&self) {
        self.core.cell.update(|s| {
            s.supersede();
            s.thread = None;
            s.error = None;
            s.send_token = None;
        });
        tracing::info!("Conversation state reset");
        self.core.persist().await;
    }
}
