//! Engine state, observation snapshots and release guards

use crate::model::Thread;
use crate::transport::ThreadError;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Handle to the single in-flight thread creation
pub(crate) type PendingCreation = Shared<BoxFuture<'static, Result<String, ThreadError>>>;

/// Read-only view of the engine handed to observers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSnapshot {
    /// Current thread, `None` until one has been created or restored
    pub thread: Option<Thread>,
    /// True while a whole-thread create or reload is running
    pub loading: bool,
    /// Last user-facing failure, cleared by the next successful operation
    pub error: Option<String>,
    /// True while a send is outstanding
    pub sending: bool,
}

pub(crate) struct EngineState {
    pub thread: Option<Thread>,
    pub error: Option<String>,
    /// Bumped whenever the conversation is replaced or reset. Work started
    /// under an older generation must not touch the current one.
    pub generation: u64,
    /// Outstanding create/reload operations of the current generation
    pub loading: u32,
    pub creating: Option<PendingCreation>,
    pub send_token: Option<u64>,
    next_send_token: u64,
}

impl EngineState {
    fn new() -> Self {
        Self {
            thread: None,
            error: None,
            generation: 0,
            loading: 0,
            creating: None,
            send_token: None,
            next_send_token: 0,
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            thread: self.thread.clone(),
            loading: self.loading > 0,
            error: self.error.clone(),
            sending: self.send_token.is_some(),
        }
    }

    /// Start a new generation: forget the in-flight creation and any loading
    /// owned by the previous one.
    pub fn supersede(&mut self) {
        self.generation += 1;
        self.creating = None;
        self.loading = 0;
    }

    pub fn thread_is(&self, thread_id: &str) -> bool {
        self.thread.as_ref().is_some_and(|t| t.id == thread_id)
    }
}

/// Mutex-protected state plus the channel snapshots are published on.
///
/// The lock is never held across an await.
pub(crate) struct StateCell {
    state: Mutex<EngineState>,
    published: watch::Sender<EngineSnapshot>,
}

impl StateCell {
    pub fn new() -> Self {
        let (published, _) = watch::channel(EngineSnapshot::default());
        Self {
            state: Mutex::new(EngineState::new()),
            published,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, state: &EngineState) {
        self.published.send_replace(state.snapshot());
    }

    /// Mutate the state and publish the result
    pub fn update<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        self.publish(&state);
        result
    }

    pub fn read<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        f(&self.lock())
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.published.subscribe()
    }
}

/// Clears the creation slot and its loading count when the creation task
/// ends, however it ends.
pub(crate) struct CreationGuard {
    cell: Arc<StateCell>,
    generation: u64,
}

impl CreationGuard {
    /// Caller must already have counted the creation in `loading`
    pub fn new(cell: Arc<StateCell>, generation: u64) -> Self {
        Self { cell, generation }
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        self.cell.update(|s| {
            if s.generation == self.generation {
                s.creating = None;
                s.loading = s.loading.saturating_sub(1);
            }
        });
    }
}

/// Holds the loading flag for a reload
pub(crate) struct LoadingGuard {
    cell: Arc<StateCell>,
    generation: u64,
}

impl LoadingGuard {
    pub fn begin(cell: &Arc<StateCell>) -> Self {
        let generation = cell.update(|s| {
            s.loading += 1;
            s.generation
        });
        Self {
            cell: Arc::clone(cell),
            generation,
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.cell.update(|s| {
            if s.generation == self.generation {
                s.loading = s.loading.saturating_sub(1);
            }
        });
    }
}

/// Exclusive claim on the send-in-progress flag
pub(crate) struct SendGuard {
    cell: Arc<StateCell>,
    token: u64,
    generation: u64,
}

impl SendGuard {
    /// Claim the flag, or `None` if another send holds it
    pub fn claim(cell: &Arc<StateCell>) -> Option<Self> {
        let mut state = cell.lock();
        if state.send_token.is_some() {
            return None;
        }
        state.next_send_token += 1;
        let token = state.next_send_token;
        state.send_token = Some(token);
        let generation = state.generation;
        cell.publish(&state);
        Some(Self {
            cell: Arc::clone(cell),
            token,
            generation,
        })
    }

    /// Generation the flag was claimed under
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this claim still owns the flag and `generation` is current
    pub fn is_current(&self, generation: u64) -> bool {
        self.cell.read(|s| s.send_token == Some(self.token) && s.generation == generation)
    }
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.cell.update(|s| {
            if s.send_token == Some(self.token) {
                s.send_token = None;
            }
        });
    }
}
