//! Thread API transport
//!
//! Provides the interface the engine uses to talk to the remote service.

mod config;
mod error;
mod http;
mod wire;

pub use config::TransportConfig;
pub use error::{ThreadError, ThreadErrorKind};
pub use http::HttpTransport;

use crate::model::{Message, Thread};
use async_trait::async_trait;
use std::sync::Arc;

/// Response to a thread creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedThread {
    pub id: String,
}

/// A user message bound for a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub thread_id: String,
    pub text: String,
}

/// Validated reply to a sent message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReply {
    pub assistant_message: Message,
}

/// Remote thread operations
#[async_trait]
pub trait ThreadTransport: Send + Sync {
    /// Create an empty thread on the server
    async fn create_thread(&self) -> Result<CreatedThread, ThreadError>;

    /// Fetch a thread with its full message list
    async fn get_thread(&self, thread_id: &str) -> Result<Thread, ThreadError>;

    /// Send a user message and wait for the assistant's reply
    async fn send_message(&self, request: &SendRequest) -> Result<SendReply, ThreadError>;
}

#[async_trait]
impl<T: ThreadTransport + ?Sized> ThreadTransport for Arc<T> {
    async fn create_thread(&self) -> Result<CreatedThread, ThreadError> {
        (**self).create_thread().await
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, ThreadError> {
        (**self).get_thread(thread_id).await
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendReply, ThreadError> {
        (**self).send_message(request).await
    }
}

/// Logging wrapper for transports
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T: ThreadTransport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    fn log<R>(
        operation: &str,
        thread_id: Option<&str>,
        start: std::time::Instant,
        result: &Result<R, ThreadError>,
    ) {
        let duration = start.elapsed();
        let thread_id = thread_id.unwrap_or("-");
        match result {
            Ok(_) => {
                tracing::info!(
                    operation,
                    thread_id,
                    duration_ms = %duration.as_millis(),
                    "Thread request completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    operation,
                    thread_id,
                    duration_ms = %duration.as_millis(),
                    kind = e.kind.as_str(),
                    error = %e.message,
                    "Thread request failed"
                );
            }
        }
    }
}

#[async_trait]
impl<T: ThreadTransport> ThreadTransport for LoggingTransport<T> {
    async fn create_thread(&self) -> Result<CreatedThread, ThreadError> {
        let start = std::time::Instant::now();
        let result = self.inner.create_thread().await;
        let created = result.as_ref().ok().map(|c| c.id.clone());
        Self::log("create_thread", created.as_deref(), start, &result);
        result
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, ThreadError> {
        let start = std::time::Instant::now();
        let result = self.inner.get_thread(thread_id).await;
        Self::log("get_thread", Some(thread_id), start, &result);
        result
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendReply, ThreadError> {
        let start = std::time::Instant::now();
        let result = self.inner.send_message(request).await;
        Self::log("send_message", Some(&request.thread_id), start, &result);
        result
    }
}
