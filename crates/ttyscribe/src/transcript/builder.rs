//! Incremental transcript builder.
//!
//! The host calls [`TranscriptBuilder::advance`] every time new bytes arrive,
//! passing the whole buffer accumulated so far together with the messages and
//! state returned by the previous call. Only the suffix after
//! `state.last_processed_index` is scanned, so every byte is interpreted once.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, warn};
use ttyscribe_protocol::events::{error_message, is_failed_result, result_text};
use ttyscribe_protocol::{BlockDelta, ContentBlock, StreamEvent, try_parse_line};

use super::models::{Message, Role, ToolInvocation, ToolStatus};
use super::state::{ParserState, StreamMode};
use crate::clock::{Clock, SystemClock};
use crate::ids::{IdGenerator, UuidIds};
use crate::noise;

/// Prefix put in front of a message whose turn included thinking.
pub const THINKING_MARKER: &str = "[Thinking]";

/// How long a raw user line keeps absorbing follow-up lines, in milliseconds.
pub const DEFAULT_RECENCY_WINDOW_MS: i64 = 3_000;

/// Default ceiling on a single message's content, in characters.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 1024 * 1024;

/// Tunables for the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Raw lines arriving within this window of the last user message are merged into it.
    pub recency_window: Duration,
    /// Content beyond this many characters is dropped. `None` disables the cap.
    pub max_content_chars: Option<usize>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            recency_window: Duration::milliseconds(DEFAULT_RECENCY_WINDOW_MS),
            max_content_chars: Some(DEFAULT_MAX_CONTENT_CHARS),
        }
    }
}

/// Result of one [`TranscriptBuilder::advance`] pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    pub messages: Vec<Message>,
    pub state: ParserState,
    /// Whether `messages` differs from the input list.
    pub changed: bool,
}

/// Folds pty output into an ordered list of messages.
#[derive(Clone)]
pub struct TranscriptBuilder {
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    options: BuilderOptions,
}

impl Default for TranscriptBuilder {
    fn default() -> Self {
        Self::new(BuilderOptions::default())
    }
}

impl TranscriptBuilder {
    /// Create a builder with random ids and the system clock.
    pub fn new(options: BuilderOptions) -> Self {
        Self {
            ids: Arc::new(UuidIds),
            clock: Arc::new(SystemClock),
            options,
        }
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Finalize a trailing open message left behind by a stream that is gone.
    ///
    /// Returns whether a message was closed.
    pub fn close_open(&self, messages: &mut [Message]) -> bool {
        match messages.last_mut() {
            Some(last) if !last.is_complete => {
                debug!(message_id = %last.id, "closing open message from a previous stream");
                last.finalize(self.clock.now());
                true
            }
            _ => false,
        }
    }

    /// Fold the unprocessed suffix of `buffer` into `messages`.
    ///
    /// Never fails: unparseable lines fall back to the raw-text path or are
    /// dropped, and unknown events are ignored.
    pub fn advance(&self, buffer: &str, messages: Vec<Message>, mut state: ParserState) -> Advance {
        if state.last_processed_index > buffer.len() {
            warn!(
                processed = state.last_processed_index,
                buffer_len = buffer.len(),
                "buffer shrank below processed offset; resynchronizing"
            );
            state.last_processed_index = buffer.len();
            return Advance {
                messages,
                state,
                changed: false,
            };
        }

        let start = next_char_boundary(buffer, state.last_processed_index);
        let pending = &buffer[start..];
        if pending.is_empty() {
            state.last_processed_index = buffer.len();
            return Advance {
                messages,
                state,
                changed: false,
            };
        }

        let mut fold = Fold::new(self, messages, state);
        for line in pending.split('\n') {
            fold.line(line);
        }

        let Fold {
            messages,
            mut state,
            changed,
            ..
        } = fold;
        state.last_processed_index = buffer.len();

        Advance {
            messages,
            state,
            changed,
        }
    }
}

fn next_char_boundary(buffer: &str, mut index: usize) -> usize {
    while index < buffer.len() && !buffer.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Serialized tool arguments, or `None` for an absent or empty input.
fn serialize_args(input: &Value) -> Option<String> {
    match input {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// Working set for a single `advance` pass.
struct Fold<'a> {
    builder: &'a TranscriptBuilder,
    now: DateTime<Utc>,
    messages: Vec<Message>,
    state: ParserState,
    /// Index of the open (incomplete) message, always the last one.
    open: Option<usize>,
    changed: bool,
}

impl<'a> Fold<'a> {
    fn new(builder: &'a TranscriptBuilder, messages: Vec<Message>, state: ParserState) -> Self {
        let open = match messages.last() {
            Some(last) if !last.is_complete => Some(messages.len() - 1),
            _ => None,
        };
        Self {
            builder,
            now: builder.clock.now(),
            messages,
            state,
            open,
            changed: false,
        }
    }

    fn line(&mut self, line: &str) {
        match try_parse_line(line) {
            Some(event) => {
                if self.state.mode == StreamMode::Legacy {
                    debug!(kind = event.kind(), "structured stream detected");
                    self.state.mode = StreamMode::Structured;
                }
                self.apply_event(event);
            }
            None if self.state.mode == StreamMode::Structured => {
                if !line.trim().is_empty() {
                    debug!(len = line.len(), "dropping raw line in structured stream");
                }
            }
            None => self.raw_line(line),
        }
    }

    // ========== Legacy raw text ==========

    fn raw_line(&mut self, line: &str) {
        let cleaned = noise::strip(line);
        if noise::is_garbage(&cleaned) || noise::is_lifecycle_banner(&cleaned) {
            if !cleaned.is_empty() {
                debug!(line = %cleaned, "discarding terminal noise");
            }
            return;
        }

        if self.open.is_some() || self.state.in_assistant_turn() {
            return;
        }

        let window = self.builder.options.recency_window;
        let now = self.now;
        let recent_user = self.messages.last().is_some_and(|last| {
            let age = now - last.timestamp;
            last.role == Role::User && age >= Duration::zero() && age <= window
        });
        if recent_user {
            let idx = self.messages.len() - 1;
            self.append(idx, &format!("\n{}", cleaned));
            return;
        }

        let duplicate = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .is_some_and(|m| m.content == cleaned);
        if duplicate {
            debug!(line = %cleaned, "skipping repeated user line");
            return;
        }

        let id = self.builder.ids.next_id("msg");
        self.messages.push(Message::user(id, String::new(), now));
        self.append(self.messages.len() - 1, &cleaned);
        self.changed = true;
    }

    // ========== Structured events ==========

    fn apply_event(&mut self, event: StreamEvent) {
        let kind = event.kind();
        match event {
            StreamEvent::Assistant { message, content } => {
                let blocks = match message {
                    Some(body) if !body.content.is_empty() => body.content,
                    _ => content,
                };
                self.push_whole_assistant(blocks);
            }
            StreamEvent::ContentBlockStart { content_block, .. } => self.start_block(content_block),
            StreamEvent::ContentBlockDelta { delta, .. } => self.apply_delta(delta),
            StreamEvent::ContentBlockStop { .. } => self.state.is_thinking = false,
            StreamEvent::MessageDelta { .. } | StreamEvent::MessageStop => self.finalize_open(),
            StreamEvent::Result {
                subtype,
                is_error,
                result,
            } => self.attach_result(is_failed_result(subtype.as_deref(), is_error), &result),
            StreamEvent::Error { error } => self.apply_error(&error),
            StreamEvent::System { subtype, .. } => {
                debug!(subtype = subtype.as_deref().unwrap_or(""), "system event");
            }
            StreamEvent::MessageStart { .. } | StreamEvent::Unknown => {
                debug!(kind, "ignoring event");
            }
        }
    }

    fn push_whole_assistant(&mut self, blocks: Vec<ContentBlock>) {
        self.finalize_open();

        let mut text = String::new();
        let mut tools = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text: fragment } => {
                    text.push_str(&noise::strip_escapes(&fragment));
                }
                ContentBlock::ToolUse { id, name, input } => {
                    let id = id.unwrap_or_else(|| self.builder.ids.next_id("tool"));
                    tools.push(ToolInvocation::done(id, name, serialize_args(&input), self.now));
                }
                ContentBlock::Thinking { .. } | ContentBlock::Unknown => {}
            }
        }

        let id = self.builder.ids.next_id("msg");
        self.messages
            .push(Message::assistant(id, String::new(), tools, self.now));
        self.append(self.messages.len() - 1, &text);
        self.changed = true;
    }

    fn start_block(&mut self, block: ContentBlock) {
        let idx = self.ensure_open();
        self.state.current_role = Some(Role::Assistant);

        match block {
            ContentBlock::ToolUse { id, name, input } => {
                let id = id.unwrap_or_else(|| self.builder.ids.next_id("tool"));
                let tool = ToolInvocation::running(id, name, serialize_args(&input), self.now);
                self.messages[idx].tools.push(tool);
                self.state.is_streaming = true;
                self.changed = true;
            }
            ContentBlock::Thinking { .. } => self.state.is_thinking = true,
            ContentBlock::Text { text } => {
                self.state.is_streaming = true;
                let cleaned = noise::strip_escapes(&text);
                if !cleaned.is_empty() {
                    self.append(idx, &cleaned);
                }
            }
            ContentBlock::Unknown => {}
        }
    }

    fn apply_delta(&mut self, delta: BlockDelta) {
        let idx = self.ensure_open();
        self.state.current_role = Some(Role::Assistant);

        match delta {
            BlockDelta::TextDelta { text } => {
                self.state.is_streaming = true;
                let cleaned = noise::strip_escapes(&text);
                if !cleaned.is_empty() {
                    self.append(idx, &cleaned);
                }
            }
            BlockDelta::ThinkingDelta { .. } => {
                self.state.is_thinking = true;
                if !self.messages[idx].content.starts_with(THINKING_MARKER) {
                    self.prepend(idx, &format!("{}\n", THINKING_MARKER));
                }
            }
            BlockDelta::InputJsonDelta { partial_json } => {
                let running = self.messages[idx]
                    .tools
                    .iter_mut()
                    .rev()
                    .find(|t| t.is_running());
                if let Some(tool) = running {
                    tool.args
                        .get_or_insert_with(String::new)
                        .push_str(&partial_json);
                    self.changed = true;
                }
            }
            BlockDelta::Unknown => {}
        }
    }

    fn attach_result(&mut self, failed: bool, result: &Value) {
        let target = self
            .open
            .or_else(|| self.messages.iter().rposition(|m| m.role == Role::Assistant));
        let Some(idx) = target else {
            debug!("result event without an assistant message");
            return;
        };

        let now = self.now;
        let Some(tool) = self.messages[idx].last_tool_mut() else {
            debug!("result event without a tool invocation");
            return;
        };

        let status = if failed {
            ToolStatus::Error
        } else {
            ToolStatus::Done
        };
        let finished = tool.finish(status, now);
        let output = result_text(result);
        if output.is_some() {
            tool.result = output;
            self.changed = true;
        }
        self.changed |= finished;
    }

    fn apply_error(&mut self, error: &Value) {
        let idx = self.ensure_open();
        let marker = format!("[Error: {}]", error_message(error));
        let text = if self.messages[idx].content.is_empty() {
            marker
        } else {
            format!("\n{}", marker)
        };
        self.append(idx, &text);
        self.finalize_open();
    }

    // ========== Helpers ==========

    /// Index of the open message, creating an assistant one if none is open.
    fn ensure_open(&mut self) -> usize {
        if let Some(idx) = self.open {
            return idx;
        }
        let id = self.builder.ids.next_id("msg");
        self.messages.push(Message::open_assistant(id, self.now));
        let idx = self.messages.len() - 1;
        self.open = Some(idx);
        self.changed = true;
        idx
    }

    fn finalize_open(&mut self) {
        if let Some(idx) = self.open.take() {
            self.messages[idx].finalize(self.now);
            self.changed = true;
        }
        self.state.end_turn();
    }

    fn append(&mut self, idx: usize, text: &str) {
        let cap = self.builder.options.max_content_chars;
        let message = &mut self.messages[idx];
        let (before, was_truncated) = (message.content.len(), message.truncated);
        message.append_content(text, cap);
        self.changed |= message.content.len() > before;
        self.note_truncation(idx, was_truncated);
    }

    fn prepend(&mut self, idx: usize, text: &str) {
        let cap = self.builder.options.max_content_chars;
        let message = &mut self.messages[idx];
        let was_truncated = message.truncated;
        self.changed |= message.prepend_content(text, cap);
        self.note_truncation(idx, was_truncated);
    }

    /// Warn the first time a message starts dropping content.
    fn note_truncation(&mut self, idx: usize, was_truncated: bool) {
        let message = &self.messages[idx];
        if message.truncated && !was_truncated {
            warn!(
                message_id = %message.id,
                cap = self.builder.options.max_content_chars.unwrap_or_default(),
                "message content reached cap; dropping further output"
            );
            self.changed = true;
        }
    }
}
