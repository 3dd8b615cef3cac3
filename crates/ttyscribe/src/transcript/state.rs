//! Parser state carried between incremental builder calls.

use serde::{Deserialize, Serialize};

use super::models::{Message, Role};

/// Which wire format the session has been identified as.
///
/// A session starts in `Legacy` and switches to `Structured` on the first line
/// that parses as a stream event. The switch is permanent for that session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    #[default]
    Legacy,
    Structured,
}

/// Everything the builder needs to resume where it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserState {
    /// Byte offset into the cumulative buffer already folded into messages.
    pub last_processed_index: usize,
    /// Role of the content currently mid-flight, if any.
    pub current_role: Option<Role>,
    pub is_streaming: bool,
    pub is_thinking: bool,
    pub mode: StreamMode,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state for a new buffer over `messages`.
    ///
    /// A trailing open assistant message means its turn is still in flight.
    pub fn resume(messages: &[Message]) -> Self {
        match messages.last() {
            Some(last) if !last.is_complete && last.role == Role::Assistant => Self {
                current_role: Some(Role::Assistant),
                is_streaming: true,
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    /// True while an assistant turn is being streamed.
    pub fn in_assistant_turn(&self) -> bool {
        self.current_role == Some(Role::Assistant) && self.is_streaming
    }

    /// Forget the in-flight turn but keep position and mode.
    pub(crate) fn end_turn(&mut self) {
        self.current_role = None;
        self.is_streaming = false;
        self.is_thinking = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[test]
    fn test_resume_derives_turn_from_open_message() {
        let at = DateTime::<Utc>::UNIX_EPOCH;
        let mut messages = vec![Message::user("msg_1".into(), "hi", at)];
        assert_eq!(ParserState::resume(&messages), ParserState::new());

        messages.push(Message::open_assistant("msg_2".into(), at));
        let state = ParserState::resume(&messages);
        assert!(state.in_assistant_turn());
        assert_eq!(state.last_processed_index, 0);
        assert_eq!(state.mode, StreamMode::Legacy);
    }
}
