//! Wire format for the thread API and its validation
//!
//! Bodies are decoded into loose wire structs first, then checked field by
//! field so every mismatch becomes a `Validation` error with a useful message.

use super::ThreadError;
use crate::model::{Message, MessageOrigin, Role, Thread, ThreadMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageBody<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCreatedThread {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    pub id: Option<String>,
    pub role: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireThread {
    pub id: Option<String>,
    pub messages: Option<Vec<WireMessage>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSendReply {
    pub assistant_message: Option<WireMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorBody {
    pub error: Option<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String, ThreadError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(ThreadError::validation(format!("Invalid response: `{field}` is empty"))),
        None => Err(ThreadError::validation(format!("Invalid response: missing `{field}`"))),
    }
}

pub(crate) fn parse_body<'de, T: Deserialize<'de>>(body: &'de str) -> Result<T, ThreadError> {
    serde_json::from_str(body)
        .map_err(|e| ThreadError::validation(format!("Invalid response: {e}")))
}

impl WireCreatedThread {
    pub fn validate(self) -> Result<String, ThreadError> {
        required(self.id, "id")
    }
}

impl WireMessage {
    pub fn validate(self) -> Result<Message, ThreadError> {
        let id = required(self.id, "message.id")?;
        let role_str = required(self.role, "message.role")?;
        let role = Role::parse(&role_str).ok_or_else(|| {
            ThreadError::validation(format!("Invalid response: unknown role `{role_str}`"))
        })?;
        let content = required(self.content, "message.content")?;
        let created_at = required(self.created_at, "message.created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| {
                ThreadError::validation(format!(
                    "Invalid response: bad timestamp `{created_at}`: {e}"
                ))
            })?
            .with_timezone(&Utc);

        Ok(Message {
            id,
            role,
            content,
            created_at,
            origin: MessageOrigin::Server,
        })
    }
}

impl WireThread {
    pub fn validate(self, expected_id: &str) -> Result<Thread, ThreadError> {
        let id = required(self.id, "id")?;
        if id != expected_id {
            return Err(ThreadError::validation(format!(
                "Invalid response: asked for thread {expected_id}, got {id}"
            )));
        }
        let messages = self
            .messages
            .ok_or_else(|| ThreadError::validation("Invalid response: missing `messages`"))?
            .into_iter()
            .map(WireMessage::validate)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Thread::with_messages(id, messages).with_metadata(ThreadMetadata {
            title: self.title,
            summary: self.summary,
        }))
    }
}

impl WireSendReply {
    pub fn validate(self) -> Result<Message, ThreadError> {
        let message = self
            .assistant_message
            .ok_or_else(|| {
                ThreadError::validation("Invalid response: missing `assistant_message`")
            })?
            .validate()?;
        if message.role != Role::Assistant {
            return Err(ThreadError::validation(format!(
                "Invalid response: reply has role `{}`",
                message.role
            )));
        }
        Ok(message)
    }
}

impl WireErrorBody {
    /// Machine-readable error code, if the body carries one
    pub fn code(body: &str) -> Option<String> {
        serde_json::from_str::<Self>(body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.code)
    }

    pub fn message(body: &str) -> Option<String> {
        serde_json::from_str::<Self>(body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
    }
}
