//! ttyscribe Library
//!
//! Reconstructs a chat transcript from the pseudo-terminal output of an AI
//! assistant process and keeps it in a resumable session store.

pub mod clock;
pub mod config;
pub mod ids;
pub mod noise;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod transcript;

pub use recorder::TranscriptRecorder;
pub use session::{Session, SessionStore};
pub use transcript::{Message, ParserState, TranscriptBuilder};
