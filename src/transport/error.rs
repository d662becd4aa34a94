//! Transport error types

use thiserror::Error;

/// Transport failure with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ThreadError {
    pub kind: ThreadErrorKind,
    pub message: String,
}

impl ThreadError {
    pub fn new(kind: ThreadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ThreadErrorKind::Validation, message)
    }

    pub fn thread_not_found(message: impl Into<String>) -> Self {
        Self::new(ThreadErrorKind::ThreadNotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ThreadErrorKind::Transport, message)
    }

    pub fn is_thread_not_found(&self) -> bool {
        self.kind == ThreadErrorKind::ThreadNotFound
    }
}

/// Error classification for the recovery logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadErrorKind {
    /// Response did not match the expected shape - never retried
    Validation,
    /// Server no longer knows the thread - recoverable once by recreating it
    ThreadNotFound,
    /// Network, timeout or server failure - terminal for the call
    Transport,
}

impl ThreadErrorKind {
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::ThreadNotFound)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::ThreadNotFound => "thread_not_found",
            Self::Transport => "transport",
        }
    }
}
