//! Mock implementations for testing
//!
//! These mocks let the engine run without a server or a database.

use super::traits::StateStore;
use crate::db::PersistedState;
use crate::model::{Message, MessageOrigin, Role, Thread};
use crate::transport::{CreatedThread, SendReply, SendRequest, ThreadError, ThreadTransport};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

// ============================================================================
// Mock Transport
// ============================================================================

/// Mock transport with queued responses and optional gates.
///
/// With nothing queued, creation yields `thread-1`, `thread-2`, ... and sends
/// are answered with `reply to <text>`. A gated call is recorded first and
/// then blocks until the test releases it.
#[derive(Default)]
pub struct MockTransport {
    creates: Mutex<VecDeque<Result<CreatedThread, ThreadError>>>,
    threads: Mutex<VecDeque<Result<Thread, ThreadError>>>,
    replies: Mutex<VecDeque<Result<SendReply, ThreadError>>>,
    create_gate: Option<Arc<Semaphore>>,
    send_gate: Option<Arc<Semaphore>>,
    create_calls: AtomicUsize,
    panic_creates: AtomicBool,
    get_calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<SendRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every `create_thread` call until `release_creates`
    #[must_use]
    pub fn gate_creates(mut self) -> Self {
        self.create_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Hold every `send_message` call until `release_sends`
    #[must_use]
    pub fn gate_sends(mut self) -> Self {
        self.send_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release_creates(&self, n: usize) {
        if let Some(gate) = &self.create_gate {
            gate.add_permits(n);
        }
    }

    pub fn release_sends(&self, n: usize) {
        if let Some(gate) = &self.send_gate {
            gate.add_permits(n);
        }
    }

    /// Make later `create_thread` calls panic after passing the gate
    pub fn panic_creates(&self, panic: bool) {
        self.panic_creates.store(panic, Ordering::SeqCst);
    }

    pub fn queue_create(&self, result: Result<CreatedThread, ThreadError>) {
        self.creates.lock().unwrap().push_back(result);
    }

    pub fn queue_thread(&self, result: Result<Thread, ThreadError>) {
        self.threads.lock().unwrap().push_back(result);
    }

    pub fn queue_reply(&self, result: Result<SendReply, ThreadError>) {
        self.replies.lock().unwrap().push_back(result);
    }

    pub fn queue_send_error(&self, error: ThreadError) {
        self.queue_reply(Err(error));
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.get_calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Total number of transport calls of any kind
    pub fn total_calls(&self) -> usize {
        self.create_calls() + self.get_calls().len() + self.sent().len()
    }

    async fn pass(gate: Option<&Arc<Semaphore>>) {
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[async_trait]
impl ThreadTransport for MockTransport {
    async fn create_thread(&self) -> Result<CreatedThread, ThreadError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Self::pass(self.create_gate.as_ref()).await;
        assert!(
            !self.panic_creates.load(Ordering::SeqCst),
            "create_thread panicked"
        );
        self.creates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CreatedThread { id: format!("thread-{n}") }))
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, ThreadError> {
        self.get_calls.lock().unwrap().push(thread_id.to_string());
        self.threads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ThreadError::transport("No mock thread queued")))
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendReply, ThreadError> {
        self.sent.lock().unwrap().push(request.clone());
        Self::pass(self.send_gate.as_ref()).await;
        let queued = self.replies.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            Ok(SendReply {
                assistant_message: assistant(&format!("reply to {}", request.text)),
            })
        })
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory store with save counting and injectable failures
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<Option<PersistedState>>,
    saves: AtomicUsize,
    save_gate: Option<Arc<Semaphore>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        let store = Self::new();
        *store.state.lock().unwrap() = Some(state);
        store
    }

    pub fn with_thread(thread: Thread) -> Self {
        Self::with_state(PersistedState::new(Some(thread)))
    }

    /// Hold every `save` until `release_saves`
    #[must_use]
    pub fn gate_saves(mut self) -> Self {
        self.save_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release_saves(&self, n: usize) {
        if let Some(gate) = &self.save_gate {
            gate.add_permits(n);
        }
    }

    pub fn stored(&self) -> Option<PersistedState> {
        self.state.lock().unwrap().clone()
    }

    pub fn stored_thread(&self) -> Option<Thread> {
        self.stored().and_then(|s| s.thread)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn load(&self) -> Result<Option<PersistedState>, String> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err("disk unreadable".to_string());
        }
        Ok(self.stored())
    }

    async fn save(&self, state: &PersistedState) -> Result<(), String> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        MockTransport::pass(self.save_gate.as_ref()).await;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err("disk full".to_string());
        }
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Server-side assistant message
pub fn assistant(text: &str) -> Message {
    server_message(Role::Assistant, text)
}

pub fn server_message(role: Role, text: &str) -> Message {
    Message {
        id: format!("srv-{}", uuid::Uuid::new_v4()),
        role,
        content: text.to_string(),
        created_at: Utc::now(),
        origin: MessageOrigin::Server,
    }
}

/// A thread with one completed exchange
pub fn thread_with_history(id: &str) -> Thread {
    Thread::with_messages(
        id,
        vec![
            server_message(Role::User, "What should I train today?"),
            assistant("Legs. Squats first."),
        ],
    )
}

/// Poll `condition` until it holds, yielding to other tasks in between
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 5s");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ThreadErrorKind;

    #[tokio::test]
    async fn test_mock_transport_defaults() {
        let mock = MockTransport::new();

        let first = mock.create_thread().await.unwrap();
        let second = mock.create_thread().await.unwrap();
        assert_eq!(first.id, "thread-1");
        assert_eq!(second.id, "thread-2");

        let reply = mock
            .send_message(&SendRequest {
                thread_id: "thread-1".to_string(),
                text: "hi".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(reply.assistant_message.content, "reply to hi");
        assert_eq!(reply.assistant_message.role, Role::Assistant);

        let err = mock.get_thread("thread-1").await.unwrap_err();
        assert_eq!(err.kind, ThreadErrorKind::Transport);
        assert_eq!(mock.total_calls(), 4);
    }

    #[tokio::test]
    async fn test_mock_transport_queue_and_gate() {
        let mock = Arc::new(MockTransport::new().gate_creates());
        mock.queue_create(Err(ThreadError::transport("down")));

        let task = {
            let mock = Arc::clone(&mock);
            tokio::spawn(async move { mock.create_thread().await })
        };
        wait_until(|| mock.create_calls() == 1).await;
        assert!(!task.is_finished());

        mock.release_creates(1);
        let result = task.await.unwrap();
        assert_eq!(result.unwrap_err().message, "down");
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryStore::new();
        assert!(store.load().await.unwrap().is_none());

        store
            .save(&PersistedState::new(Some(Thread::new("t-1"))))
            .await
            .unwrap();
        assert_eq!(store.stored_thread().unwrap().id, "t-1");

        store.fail_saves(true);
        assert!(store.save(&PersistedState::empty()).await.is_err());
        assert_eq!(store.stored_thread().unwrap().id, "t-1");
        assert_eq!(store.save_count(), 2);

        store.fail_loads(true);
        assert!(store.load().await.is_err());
    }
}
