//! Conversation data model
//!
//! Messages are immutable once appended; a thread's message list is shared
//! and replaced wholesale on every change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Prefix for client-generated message ids
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a message's identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    /// Built on this device before the server saw it
    Local,
    /// Returned by the server
    #[default]
    Server,
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub origin: MessageOrigin,
}

impl Message {
    /// Build the provisional record for text the user just typed.
    ///
    /// The id is client-generated and only needs to be unique on this device.
    pub fn local_user(text: &str) -> Self {
        Self {
            id: format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4()),
            role: Role::User,
            content: text.to_string(),
            created_at: Utc::now(),
            origin: MessageOrigin::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == MessageOrigin::Local
    }
}

/// Server-side fields the engine carries but never interprets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// The server-tracked conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    messages: Arc<[Message]>,
    #[serde(default)]
    pub metadata: ThreadMetadata,
}

impl Thread {
    /// A freshly created, empty thread
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Arc::from(Vec::new()),
            metadata: ThreadMetadata::default(),
        }
    }

    pub fn with_messages(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages: Arc::from(messages),
            metadata: ThreadMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: ThreadMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Messages in conversation order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Copy-on-write append. `self` is left untouched so readers holding it
    /// keep a consistent view.
    #[must_use]
    pub fn appended(&self, message: Message) -> Self {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.extend_from_slice(&self.messages);
        messages.push(message);
        Self {
            id: self.id.clone(),
            messages: Arc::from(messages),
            metadata: self.metadata.clone(),
        }
    }

    /// Whether two threads share the same message list allocation
    pub fn shares_messages_with(&self, other: &Thread) -> bool {
        Arc::ptr_eq(&self.messages, &other.messages)
    }
}
