//! Wire types for the structured output of a pty-hosted assistant process.
//!
//! The assistant emits newline-delimited JSON objects tagged by a `type` field:
//!
//! ```text
//! {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}
//! {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}
//! {"type":"message_stop"}
//! ```
//!
//! The same byte stream may instead carry raw, escape-laden terminal text. This
//! crate only answers the question "is this line a stream event, and which one";
//! folding events into a transcript happens in the `ttyscribe` crate.

pub mod events;
pub mod parse;

pub use events::{AssistantBody, BlockDelta, ContentBlock, StreamEvent};
pub use parse::try_parse_line;
