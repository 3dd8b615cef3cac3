//! Session persistence.
//!
//! A session binds a terminal identity to the transcript reconstructed from it,
//! so a conversation survives restarts and can be resumed.

mod models;
mod store;

pub use models::{Session, SessionPatch};
pub use store::{DEFAULT_RETENTION, DEFAULT_SESSIONS_KEY, SessionStore, SessionStoreOptions};
