//! Stream event types.
//!
//! Events mirror the streaming message API of the assistant: a turn is either
//! delivered whole (`assistant`) or as a sequence of block start / delta / stop
//! events closed by `message_stop`. Unknown tags deserialize to `Unknown` so new
//! event kinds never break an older reader.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Events
// ============================================================================

/// One line of structured output from the assistant process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A complete, non-streaming assistant message.
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<AssistantBody>,
        /// Some emitters put the blocks at the top level instead of under `message`.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        content: Vec<ContentBlock>,
    },
    /// A streamed message begins.
    MessageStart {
        #[serde(default)]
        message: Value,
    },
    /// A content block is opened.
    ContentBlockStart {
        #[serde(default)]
        index: usize,
        #[serde(default)]
        content_block: ContentBlock,
    },
    /// Incremental content for the open block.
    ContentBlockDelta {
        #[serde(default)]
        index: usize,
        #[serde(default)]
        delta: BlockDelta,
    },
    /// A content block is closed.
    ContentBlockStop {
        #[serde(default)]
        index: usize,
    },
    /// Top-level message change, usually carrying the stop reason.
    MessageDelta {
        #[serde(default)]
        delta: Value,
    },
    /// The streamed message is complete.
    MessageStop,
    /// Outcome of the most recently opened tool.
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Value,
    },
    /// The assistant process reported an error.
    Error {
        #[serde(default)]
        error: Value,
    },
    /// Process-level notice (init, hooks, ...). Never rendered.
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Valid event with a tag or shape this reader does not understand.
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// The wire tag of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Assistant { .. } => "assistant",
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Result { .. } => "result",
            StreamEvent::Error { .. } => "error",
            StreamEvent::System { .. } => "system",
            StreamEvent::Unknown => "unknown",
        }
    }
}

/// Body of an `assistant` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

// ============================================================================
// Blocks and deltas
// ============================================================================

/// A content block inside a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[default]
    #[serde(other)]
    Unknown,
}

/// Incremental update to the open content block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta {
        #[serde(default)]
        text: String,
    },
    ThinkingDelta {
        #[serde(default)]
        thinking: String,
    },
    /// Fragment of a tool call's JSON arguments.
    InputJsonDelta {
        #[serde(default)]
        partial_json: String,
    },
    #[default]
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Payload helpers
// ============================================================================

/// Human-readable message from an `error` event payload.
///
/// The payload is either a bare string or an object with a `message` field.
pub fn error_message(error: &Value) -> String {
    match error {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string()),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

/// Whether a `result` event reports a failure.
pub fn is_failed_result(subtype: Option<&str>, is_error: bool) -> bool {
    is_error || subtype.is_some_and(|s| s.starts_with("error"))
}

/// Text of a `result` payload, if it carries any.
pub fn result_text(result: &Value) -> Option<String> {
    match result {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_from_object() {
        let payload = json!({"type": "overloaded_error", "message": "Overloaded"});
        assert_eq!(error_message(&payload), "Overloaded");
    }

    #[test]
    fn test_error_message_from_string() {
        assert_eq!(error_message(&json!("boom")), "boom");
        assert_eq!(error_message(&Value::Null), "unknown error");
    }

    #[test]
    fn test_failed_result() {
        assert!(is_failed_result(None, true));
        assert!(is_failed_result(Some("error_during_execution"), false));
        assert!(!is_failed_result(Some("success"), false));
    }

    #[test]
    fn test_unknown_block_defaults() {
        let block: ContentBlock = serde_json::from_value(json!({"type": "image"})).unwrap();
        assert_eq!(block, ContentBlock::Unknown);
    }
}
