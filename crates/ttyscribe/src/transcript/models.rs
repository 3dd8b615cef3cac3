//! Transcript data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// Lifecycle of a tool invocation. Only ever moves from `Running` to a final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Done,
    Error,
}

impl ToolStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, ToolStatus::Running)
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolStatus::Running => write!(f, "running"),
            ToolStatus::Done => write!(f, "done"),
            ToolStatus::Error => write!(f, "error"),
        }
    }
}

/// A single tool call made by the assistant within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Serialized arguments, if the assistant sent any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    pub status: ToolStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Outcome text reported by a `result` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolInvocation {
    /// Create a running invocation.
    pub fn running(id: String, name: impl Into<String>, args: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            args,
            status: ToolStatus::Running,
            start_time: at,
            end_time: None,
            result: None,
        }
    }

    /// Create an invocation that is already finished (from a whole `assistant` message).
    pub fn done(id: String, name: impl Into<String>, args: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: ToolStatus::Done,
            end_time: Some(at),
            ..Self::running(id, name, args, at)
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ToolStatus::Running
    }

    /// Move a running invocation to a final status.
    ///
    /// Returns false (and changes nothing) if the invocation already finished.
    pub fn finish(&mut self, status: ToolStatus, at: DateTime<Utc>) -> bool {
        if !self.is_running() || !status.is_final() {
            return false;
        }
        self.status = status;
        self.end_time = Some(at);
        true
    }
}

/// Character count of a message's content, valid while `bytes` matches its length.
///
/// Always compares equal so it never takes part in message equality.
#[derive(Debug, Clone, Copy, Default)]
struct CharCount {
    bytes: usize,
    chars: usize,
}

impl PartialEq for CharCount {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

/// One conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tools: Vec<ToolInvocation>,
    pub timestamp: DateTime<Utc>,
    pub is_complete: bool,
    /// Set once content has been dropped at the size cap.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(skip)]
    char_count: CharCount,
}

impl Message {
    fn new(id: String, role: Role, content: String, at: DateTime<Utc>, complete: bool) -> Self {
        Self {
            id,
            role,
            content,
            tools: Vec::new(),
            timestamp: at,
            is_complete: complete,
            truncated: false,
            char_count: CharCount::default(),
        }
    }

    /// A user turn. User input is atomic, so it is complete on creation.
    pub fn user(id: String, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(id, Role::User, content.into(), at, true)
    }

    /// An assistant turn that is still streaming.
    pub fn open_assistant(id: String, at: DateTime<Utc>) -> Self {
        Self::new(id, Role::Assistant, String::new(), at, false)
    }

    /// A finished assistant turn.
    pub fn assistant(
        id: String,
        content: impl Into<String>,
        tools: Vec<ToolInvocation>,
        at: DateTime<Utc>,
    ) -> Self {
        let mut message = Self::new(id, Role::Assistant, content.into(), at, true);
        message.tools = tools;
        message
    }

    /// Characters in `content`, counted in full only when the cached count is stale.
    pub fn content_chars(&mut self) -> usize {
        if self.char_count.bytes != self.content.len() {
            self.char_count = CharCount {
                bytes: self.content.len(),
                chars: self.content.chars().count(),
            };
        }
        self.char_count.chars
    }

    fn record_chars(&mut self, chars: usize) {
        self.char_count = CharCount {
            bytes: self.content.len(),
            chars,
        };
    }

    /// Append text, stopping at `cap` characters when one is set.
    ///
    /// Returns the number of characters dropped.
    pub fn append_content(&mut self, text: &str, cap: Option<usize>) -> usize {
        let Some(cap) = cap else {
            self.content.push_str(text);
            return 0;
        };

        let used = self.content_chars();
        let incoming = text.chars().count();
        let kept = incoming.min(cap.saturating_sub(used));
        if kept == incoming {
            self.content.push_str(text);
        } else {
            self.content.extend(text.chars().take(kept));
            self.truncated = true;
        }
        self.record_chars(used + kept);
        incoming - kept
    }

    /// Insert `text` at the front if all of it fits under `cap`.
    ///
    /// A prefix that does not fit is dropped whole and marks the message truncated.
    pub fn prepend_content(&mut self, text: &str, cap: Option<usize>) -> bool {
        let Some(cap) = cap else {
            self.content.insert_str(0, text);
            return true;
        };

        let used = self.content_chars();
        let incoming = text.chars().count();
        if used + incoming > cap {
            self.truncated = true;
            return false;
        }
        self.content.insert_str(0, text);
        self.record_chars(used + incoming);
        true
    }

    /// Mark the turn complete and close any tool still running.
    pub fn finalize(&mut self, at: DateTime<Utc>) {
        self.is_complete = true;
        for tool in self.tools.iter_mut().filter(|t| t.is_running()) {
            tool.finish(ToolStatus::Done, at);
        }
    }

    pub fn last_tool_mut(&mut self) -> Option<&mut ToolInvocation> {
        self.tools.last_mut()
    }
}
