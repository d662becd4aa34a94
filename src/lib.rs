//! chat_sync - client-side synchronization of one conversation thread
//!
//! Keeps a local copy of a remote chat thread, creates it lazily, applies
//! sends optimistically and survives restarts through a local database.

pub mod db;
pub mod engine;
pub mod model;
pub mod transport;

pub use db::{Database, DbError, PersistedState};
pub use engine::{DatabaseStore, EngineSnapshot, SendOutcome, SkipReason, StateStore, ThreadEngine};
pub use model::{Message, MessageOrigin, Role, Thread, ThreadMetadata};
pub use transport::{
    HttpTransport, LoggingTransport, ThreadError, ThreadErrorKind, ThreadTransport,
    TransportConfig,
};
