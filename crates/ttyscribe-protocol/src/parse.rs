//! Line-level event parsing.

use serde_json::Value;

use crate::events::StreamEvent;

/// Try to interpret one line of pty output as a stream event.
///
/// Returns `None` when the line is not a JSON object with a string `type` tag,
/// in which case the caller falls back to its raw-text path. A tagged object
/// whose payload does not match any known shape is still an event and comes
/// back as [`StreamEvent::Unknown`].
pub fn try_parse_line(line: &str) -> Option<StreamEvent> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }

    let value: Value = serde_json::from_str(trimmed).ok()?;
    value.get("type").and_then(Value::as_str)?;

    Some(serde_json::from_value(value).unwrap_or(StreamEvent::Unknown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BlockDelta, ContentBlock};
    use serde_json::json;

    #[test]
    fn test_rejects_non_json_lines() {
        assert_eq!(try_parse_line(""), None);
        assert_eq!(try_parse_line("   "), None);
        assert_eq!(try_parse_line("hello world"), None);
        assert_eq!(try_parse_line("[1,2,3]"), None);
    }

    #[test]
    fn test_malformed_json_is_not_an_event() {
        assert_eq!(try_parse_line(r#"{"type":"message_stop""#), None);
        assert_eq!(try_parse_line("{not json}"), None);
    }

    #[test]
    fn test_untagged_object_is_not_an_event() {
        assert_eq!(try_parse_line(r#"{"foo":1}"#), None);
        assert_eq!(try_parse_line(r#"{"type":42}"#), None);
    }

    #[test]
    fn test_parse_message_stop_with_surrounding_whitespace() {
        let event = try_parse_line("  {\"type\":\"message_stop\"}\r").unwrap();
        assert_eq!(event, StreamEvent::MessageStop);
    }

    #[test]
    fn test_parse_tool_use_block_start() {
        let line = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"Bash","input":{}}}"#;
        let event = try_parse_line(line).unwrap();
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name, .. },
            } => {
                assert_eq!(index, 1);
                assert_eq!(id.as_deref(), Some("toolu_1"));
                assert_eq!(name, "Bash");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_text_delta() {
        let line = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        assert_eq!(
            try_parse_line(line),
            Some(StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::TextDelta {
                    text: "Hi".to_string()
                },
            })
        );
    }

    #[test]
    fn test_parse_assistant_message() {
        let line = json!({
            "type": "assistant",
            "message": {
                "id": "msg_1",
                "content": [
                    {"type": "text", "text": "Done."},
                    {"type": "tool_use", "id": "t1", "name": "Read", "input": {"path": "a.rs"}}
                ]
            }
        })
        .to_string();

        match try_parse_line(&line).unwrap() {
            StreamEvent::Assistant {
                message: Some(body),
                ..
            } => assert_eq!(body.content.len(), 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_accepted() {
        let event = try_parse_line(r#"{"type":"ping","at":1}"#).unwrap();
        assert_eq!(event, StreamEvent::Unknown);
    }

    #[test]
    fn test_known_type_with_bad_shape_is_unknown() {
        let event = try_parse_line(r#"{"type":"result","subtype":7}"#).unwrap();
        assert_eq!(event, StreamEvent::Unknown);
    }

    #[test]
    fn test_parse_result_and_system() {
        let result = try_parse_line(r#"{"type":"result","subtype":"success","is_error":false,"result":"ok"}"#)
            .unwrap();
        assert_eq!(result.kind(), "result");

        let system = try_parse_line(r#"{"type":"system","subtype":"init","session_id":"abc"}"#)
            .unwrap();
        assert_eq!(
            system,
            StreamEvent::System {
                subtype: Some("init".to_string()),
                session_id: Some("abc".to_string()),
            }
        );
    }
}
