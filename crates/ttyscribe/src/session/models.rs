//! Session data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transcript::Message;

/// A durable transcript record for one terminal identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Host-supplied terminal identity this session records.
    pub terminal_session_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// At most one session in a store is active.
    #[serde(default)]
    pub is_active: bool,
}

impl Session {
    /// A new, empty, active session.
    pub fn new(id: String, terminal_session_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: format!("Session {}", at.format("%Y-%m-%d %H:%M")),
            terminal_session_id: terminal_session_id.into(),
            messages: Vec::new(),
            created_at: at,
            updated_at: at,
            is_active: true,
        }
    }

    /// Apply a partial update. Returns whether anything was set.
    pub fn apply(&mut self, patch: SessionPatch) -> bool {
        let mut touched = false;
        if let Some(name) = patch.name {
            self.name = name;
            touched = true;
        }
        if let Some(messages) = patch.messages {
            self.messages = messages;
            touched = true;
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
            touched = true;
        }
        touched
    }
}

/// Fields of a [`Session`] that callers may replace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl SessionPatch {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}
