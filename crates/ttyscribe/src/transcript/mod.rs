//! Transcript reconstruction.
//!
//! Turns the cumulative pty buffer into an append-only list of [`Message`]s.

mod builder;
mod models;
mod state;

pub use builder::{
    Advance, BuilderOptions, DEFAULT_MAX_CONTENT_CHARS, DEFAULT_RECENCY_WINDOW_MS, THINKING_MARKER,
    TranscriptBuilder,
};
pub use models::{Message, Role, ToolInvocation, ToolStatus};
pub use state::{ParserState, StreamMode};
