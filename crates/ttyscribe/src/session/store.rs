//! Session store backed by a [`KvStore`].
//!
//! The full session set lives in memory and is written back, sorted by recency
//! and capped, under a single key after every mutation. Storage failures are
//! logged and never surface to the caller: a failed read starts an empty
//! store, a failed write leaves the previous payload in place.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::{Session, SessionPatch};
use crate::clock::Clock;
use crate::ids::IdGenerator;
use crate::storage::{KvStore, StorageError};
use crate::transcript::Message;

/// Key the session set is stored under.
pub const DEFAULT_SESSIONS_KEY: &str = "ttyscribe.sessions";

/// Sessions kept after each write.
pub const DEFAULT_RETENTION: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStoreOptions {
    pub key: String,
    pub retention: usize,
}

impl Default for SessionStoreOptions {
    fn default() -> Self {
        Self {
            key: DEFAULT_SESSIONS_KEY.to_string(),
            retention: DEFAULT_RETENTION,
        }
    }
}

/// Single-owner session repository.
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    options: SessionStoreOptions,
    /// Most recently updated first.
    sessions: Vec<Session>,
}

impl SessionStore {
    /// Load the stored session set. Every loaded session starts inactive.
    pub async fn load(
        kv: Arc<dyn KvStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        options: SessionStoreOptions,
    ) -> Self {
        let mut sessions = match kv.get(&options.key).await {
            Ok(Some(raw)) => decode_sessions(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key = %options.key, error = %e, "failed to read sessions; starting empty");
                Vec::new()
            }
        };

        for session in &mut sessions {
            session.is_active = false;
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(options.retention);
        debug!(count = sessions.len(), "loaded sessions");

        Self {
            kv,
            ids,
            clock,
            options,
            sessions,
        }
    }

    pub fn options(&self) -> &SessionStoreOptions {
        &self.options
    }

    // ========== Queries ==========

    /// The most recently updated session recording `terminal_id`.
    pub fn get_by_terminal_id(&self, terminal_id: &str) -> Option<&Session> {
        self.sessions
            .iter()
            .find(|s| s.terminal_session_id == terminal_id)
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// All sessions, most recently updated first.
    pub fn get_all(&self) -> &[Session] {
        &self.sessions
    }

    pub fn active(&self) -> Option<&Session> {
        self.sessions.iter().find(|s| s.is_active)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // ========== Mutations ==========

    /// Create and activate a session for `terminal_id`, deactivating all others.
    pub async fn create(&mut self, terminal_id: &str) -> Session {
        let now = self.clock.now();
        for session in &mut self.sessions {
            session.is_active = false;
        }

        let session = Session::new(self.ids.next_id("ses"), terminal_id, now);
        info!(session_id = %session.id, terminal_id, "created session");
        self.sessions.insert(0, session.clone());
        self.persist().await;
        session
    }

    /// Resume the session for `terminal_id`, or create one.
    pub async fn get_or_create(&mut self, terminal_id: &str) -> Session {
        let existing = self.get_by_terminal_id(terminal_id).map(|s| s.id.clone());
        if let Some(id) = existing
            && let Some(session) = self.set_active(&id).await
        {
            return session;
        }
        self.create(terminal_id).await
    }

    /// Make `id` the only active session.
    pub async fn set_active(&mut self, id: &str) -> Option<Session> {
        self.get(id)?;
        for session in &mut self.sessions {
            session.is_active = session.id == id;
        }
        self.touch_and_persist(id).await
    }

    /// Replace selected fields of a session.
    pub async fn update(&mut self, id: &str, patch: SessionPatch) -> Option<Session> {
        let activating = patch.is_active == Some(true);
        self.sessions.iter_mut().find(|s| s.id == id)?.apply(patch);
        if activating {
            for session in self.sessions.iter_mut().filter(|s| s.id != id) {
                session.is_active = false;
            }
        }
        self.touch_and_persist(id).await
    }

    pub async fn append(&mut self, id: &str, message: Message) -> Option<Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == id)?
            .messages
            .push(message);
        self.touch_and_persist(id).await
    }

    /// Remove a session. Returns false if it did not exist.
    pub async fn delete(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }
        info!(session_id = id, "deleted session");
        self.persist().await;
        true
    }

    /// Drop every session and the stored payload.
    pub async fn clear_all(&mut self) {
        self.sessions.clear();
        match self.kv.delete(&self.options.key).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => warn!(key = %self.options.key, error = %e, "failed to clear sessions"),
        }
    }

    // ========== Persistence ==========

    /// Stamp `updated_at`, move the session to the front, and persist.
    async fn touch_and_persist(&mut self, id: &str) -> Option<Session> {
        let pos = self.sessions.iter().position(|s| s.id == id)?;
        let mut session = self.sessions.remove(pos);
        session.updated_at = self.clock.now();
        self.sessions.insert(0, session.clone());
        self.persist().await;
        Some(session)
    }

    async fn persist(&mut self) {
        // Stable: sessions touched at the same instant keep their order
        self.sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if self.sessions.len() > self.options.retention {
            debug!(
                dropped = self.sessions.len() - self.options.retention,
                "trimming sessions past retention"
            );
            self.sessions.truncate(self.options.retention);
        }

        let payload = match serde_json::to_string(&self.sessions) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode sessions; write skipped");
                return;
            }
        };
        if let Err(e) = self.kv.set(&self.options.key, &payload).await {
            warn!(key = %self.options.key, error = %e, "failed to write sessions; write skipped");
        }
    }
}

/// Decode a stored payload, accepting a bare array or `{"sessions": [...]}`.
///
/// Records that fail to decode are skipped; an unreadable payload yields nothing.
fn decode_sessions(raw: &str) -> Vec<Session> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "stored sessions are not valid JSON; starting empty");
            return Vec::new();
        }
    };

    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove("sessions") {
            Some(Value::Array(records)) => records,
            _ => {
                warn!("stored sessions object has no sessions array; starting empty");
                return Vec::new();
            }
        },
        _ => {
            warn!("stored sessions payload has an unexpected shape; starting empty");
            return Vec::new();
        }
    };

    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<Session>(record) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "skipping unreadable session record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ids::SequentialIds;
    use crate::storage::MemoryStore;
    use chrono::Duration;

    async fn store_with(kv: Arc<MemoryStore>) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = SessionStore::load(
            kv,
            Arc::new(SequentialIds::new()),
            clock.clone(),
            SessionStoreOptions::default(),
        )
        .await;
        (store, clock)
    }

    #[tokio::test]
    async fn test_create_deactivates_others() {
        let (mut store, _) = store_with(Arc::new(MemoryStore::new())).await;
        assert!(store.get_by_terminal_id("t1").is_none());

        let first = store.create("t1").await;
        assert!(first.is_active);
        let second = store.create("t2").await;

        assert!(!store.get(&first.id).unwrap().is_active);
        assert!(store.get(&second.id).unwrap().is_active);
        assert_eq!(store.active().map(|s| s.id.as_str()), Some(second.id.as_str()));
    }

    #[tokio::test]
    async fn test_retention_keeps_most_recent() {
        let (mut store, clock) = store_with(Arc::new(MemoryStore::new())).await;
        for i in 0..51 {
            store.create(&format!("t{}", i)).await;
            clock.advance(Duration::seconds(1));
        }

        assert_eq!(store.len(), 50);
        assert!(store.get_by_terminal_id("t0").is_none());
        assert!(store.get_by_terminal_id("t50").is_some());
        assert_eq!(store.get_all()[0].terminal_session_id, "t50");
    }

    #[tokio::test]
    async fn test_load_marks_all_inactive() {
        let kv = Arc::new(MemoryStore::new());
        let (mut store, _) = store_with(kv.clone()).await;
        let session = store.create("t1").await;

        let (reloaded, _) = store_with(kv).await;
        assert_eq!(reloaded.len(), 1);
        assert!(!reloaded.get(&session.id).unwrap().is_active);
        assert!(reloaded.active().is_none());
    }

    #[tokio::test]
    async fn test_update_and_append_stamp_updated_at() {
        let (mut store, clock) = store_with(Arc::new(MemoryStore::new())).await;
        let older = store.create("t1").await;
        let newer = store.create("t2").await;

        clock.advance(Duration::seconds(30));
        let message = Message::user("msg_9".into(), "hi", clock.now());
        let updated = store.append(&older.id, message).await.unwrap();

        assert_eq!(updated.messages.len(), 1);
        assert_eq!(updated.updated_at, clock.now());
        assert_eq!(store.get_all()[0].id, older.id);
        assert_eq!(store.get_all()[1].id, newer.id);

        let renamed = store
            .update(&newer.id, SessionPatch::name("renamed"))
            .await
            .unwrap();
        assert_eq!(renamed.name, "renamed");
        assert!(store.update("ses_missing", SessionPatch::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_update_activation_is_exclusive() {
        let (mut store, _) = store_with(Arc::new(MemoryStore::new())).await;
        let first = store.create("t1").await;
        store.create("t2").await;

        let patch = SessionPatch {
            is_active: Some(true),
            ..SessionPatch::default()
        };
        store.update(&first.id, patch).await.unwrap();

        let active: Vec<_> = store.get_all().iter().filter(|s| s.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);
    }

    #[tokio::test]
    async fn test_get_or_create_resumes() {
        let (mut store, _) = store_with(Arc::new(MemoryStore::new())).await;
        let created = store.get_or_create("t1").await;
        store.create("t2").await;

        let resumed = store.get_or_create("t1").await;
        assert_eq!(resumed.id, created.id);
        assert!(resumed.is_active);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let kv = Arc::new(MemoryStore::new());
        let (mut store, _) = store_with(kv.clone()).await;
        let session = store.create("t1").await;
        store.create("t2").await;

        assert!(store.delete(&session.id).await);
        assert!(!store.delete(&session.id).await);
        assert_eq!(store.len(), 1);

        store.clear_all().await;
        assert!(store.is_empty());
        assert!(kv.is_empty());
        store.clear_all().await;
    }

    #[tokio::test]
    async fn test_corrupt_payload_loads_empty() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(DEFAULT_SESSIONS_KEY, "{not json").await.unwrap();

        let (store, _) = store_with(kv).await;
        assert!(store.is_empty());
    }

    #[test]
    fn test_decode_accepts_wrapped_payload_and_skips_bad_records() {
        let good = Session::new("ses_1".into(), "t1", chrono::DateTime::UNIX_EPOCH);
        let raw = serde_json::json!({
            "sessions": [good, {"id": "ses_2"}, 42]
        })
        .to_string();

        let sessions = decode_sessions(&raw);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "ses_1");

        assert!(decode_sessions("\"text\"").is_empty());
        assert!(decode_sessions(r#"{"other": []}"#).is_empty());
    }
}
