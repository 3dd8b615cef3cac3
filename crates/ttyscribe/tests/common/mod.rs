//! Test utilities and common setup.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use ttyscribe::clock::ManualClock;
use ttyscribe::ids::SequentialIds;
use ttyscribe::session::{SessionStore, SessionStoreOptions};
use ttyscribe::storage::KvStore;
use ttyscribe::transcript::{BuilderOptions, TranscriptBuilder};

/// A builder with deterministic ids and a clock that only moves when told.
pub fn test_builder() -> (TranscriptBuilder, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let builder = TranscriptBuilder::new(BuilderOptions::default())
        .with_ids(Arc::new(SequentialIds::new()))
        .with_clock(clock.clone());
    (builder, clock)
}

/// Load a session store over `kv` with deterministic ids and time.
pub async fn test_store(kv: Arc<dyn KvStore>) -> (SessionStore, Arc<ManualClock>) {
    test_store_with(kv, SessionStoreOptions::default()).await
}

pub async fn test_store_with(
    kv: Arc<dyn KvStore>,
    options: SessionStoreOptions,
) -> (SessionStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let store = SessionStore::load(kv, Arc::new(SequentialIds::new()), clock.clone(), options).await;
    (store, clock)
}

// ========== Event lines ==========

/// Serialize an event as one NDJSON line.
pub fn event(value: Value) -> String {
    format!("{}\n", value)
}

pub fn tool_start(name: &str) -> String {
    event(json!({
        "type": "content_block_start",
        "index": 0,
        "content_block": {"type": "tool_use", "name": name, "input": {}}
    }))
}

pub fn text_start() -> String {
    event(json!({
        "type": "content_block_start",
        "index": 0,
        "content_block": {"type": "text", "text": ""}
    }))
}

pub fn text_delta(text: &str) -> String {
    event(json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": {"type": "text_delta", "text": text}
    }))
}

pub fn thinking_delta(text: &str) -> String {
    event(json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": {"type": "thinking_delta", "thinking": text}
    }))
}

pub fn block_stop() -> String {
    event(json!({"type": "content_block_stop", "index": 0}))
}

pub fn message_stop() -> String {
    event(json!({"type": "message_stop"}))
}

pub fn tool_result(is_error: bool, output: &str) -> String {
    event(json!({"type": "result", "is_error": is_error, "result": output}))
}

/// A structured session with two turns, a tool call, and some stray noise.
pub fn structured_fixture() -> Vec<String> {
    vec![
        event(json!({"type": "system", "subtype": "init", "session_id": "abc"})),
        event(json!({"type": "message_start", "message": {"id": "m1"}})),
        thinking_delta("planning"),
        block_stop(),
        text_start(),
        text_delta("Let me look."),
        block_stop(),
        tool_start("Read"),
        "\x1b[2K\x1b[1G\n".to_string(),
        tool_result(false, "fn main() {}"),
        message_stop(),
        "{\"type\": \"content_block_delta\", broken\n".to_string(),
        text_delta("Second turn"),
        event(json!({"type": "ping"})),
        tool_start("Bash"),
        tool_result(true, "exit 2"),
        message_stop(),
    ]
}
