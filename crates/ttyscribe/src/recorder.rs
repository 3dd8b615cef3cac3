//! Host-side driver tying the transcript builder to the session store.

use tracing::debug;

use crate::session::{Session, SessionPatch, SessionStore};
use crate::transcript::{Message, ParserState, TranscriptBuilder};

/// Records one terminal's output into its session.
///
/// Owns the cumulative buffer and parser state for the bound terminal. Rebinding
/// discards both; nothing about parser state is persisted. A message left open
/// by an earlier stream is closed on bind, since that stream cannot continue.
pub struct TranscriptRecorder {
    builder: TranscriptBuilder,
    store: SessionStore,
    session_id: Option<String>,
    buffer: String,
    messages: Vec<Message>,
    state: ParserState,
}

impl TranscriptRecorder {
    pub fn new(builder: TranscriptBuilder, store: SessionStore) -> Self {
        Self {
            builder,
            store,
            session_id: None,
            buffer: String::new(),
            messages: Vec::new(),
            state: ParserState::new(),
        }
    }

    /// Resume (or create) the session for `terminal_id` and start a fresh buffer.
    pub async fn bind(&mut self, terminal_id: &str) -> Session {
        let mut session = self.store.get_or_create(terminal_id).await;
        if self.builder.close_open(&mut session.messages) {
            let patch = SessionPatch::messages(session.messages.clone());
            if let Some(updated) = self.store.update(&session.id, patch).await {
                session = updated;
            }
        }
        debug!(
            session_id = %session.id,
            terminal_id,
            messages = session.messages.len(),
            "bound recorder"
        );
        self.session_id = Some(session.id.clone());
        self.messages = session.messages.clone();
        self.buffer.clear();
        self.state = ParserState::new();
        session
    }

    /// Feed new pty output. Returns whether the transcript changed.
    ///
    /// The bound session is written only when it did.
    pub async fn push(&mut self, chunk: &str) -> bool {
        self.buffer.push_str(chunk);

        let messages = std::mem::take(&mut self.messages);
        let state = std::mem::take(&mut self.state);
        let advance = self.builder.advance(&self.buffer, messages, state);
        self.messages = advance.messages;
        self.state = advance.state;

        if !advance.changed {
            return false;
        }
        if let Some(id) = &self.session_id {
            let patch = SessionPatch::messages(self.messages.clone());
            if self.store.update(id, patch).await.is_none() {
                debug!(session_id = %id, "bound session no longer exists; transcript not saved");
            }
        }
        true
    }

    /// Drop the buffer and parser state, keeping the messages built so far.
    ///
    /// An open assistant message stays open and keeps receiving the stream.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ParserState::resume(&self.messages);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }
}
