use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::models::ConversationSession;

pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

struct Entry {
    session: Arc<tokio::sync::Mutex<ConversationSession>>,
    expires_at: NaiveDateTime,
}

/// Process-wide map from conversation id to its session. Sessions are
/// created on the first message, touched on every turn, and swept once their
/// idle TTL passes. Each session sits behind its own `tokio::Mutex`, so two
/// turns racing on the same id serialize while different sessions proceed in
/// parallel.
pub struct SessionRegistry {
    ttl: Duration,
    inner: Mutex<HashMap<String, Entry>>,
}

impl SessionRegistry {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            ttl: Duration::minutes(ttl_minutes),
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Locate the session for `id`, creating one when the id is unknown,
    /// expired, or absent. Returns the (possibly fresh) id together with the
    /// session handle; the caller locks the handle for the duration of the
    /// turn.
    pub fn get_or_create(
        &self,
        id: Option<String>,
    ) -> (String, Arc<tokio::sync::Mutex<ConversationSession>>) {
        let now = Utc::now().naive_utc();
        let mut map = self.inner.lock().expect("session registry poisoned");

        map.retain(|_, entry| entry.expires_at > now);

        let id = match id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        let entry = map.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(session = %id, "creating session");
            Entry {
                session: Arc::new(tokio::sync::Mutex::new(ConversationSession::new(
                    id.clone(),
                    now,
                ))),
                expires_at: now + self.ttl,
            }
        });
        entry.expires_at = now + self.ttl;

        (id, Arc::clone(&entry.session))
    }

    /// Refresh a session's idle deadline after a completed turn.
    pub fn touch(&self, id: &str) {
        let now = Utc::now().naive_utc();
        let mut map = self.inner.lock().expect("session registry poisoned");
        if let Some(entry) = map.get_mut(id) {
            entry.expires_at = now + self.ttl;
        }
    }

    pub fn active_count(&self) -> usize {
        let now = Utc::now().naive_utc();
        let map = self.inner.lock().expect("session registry poisoned");
        map.values().filter(|e| e.expires_at > now).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phase;

    #[tokio::test]
    async fn test_same_id_returns_same_session() {
        let registry = SessionRegistry::new(30);
        let (id, first) = registry.get_or_create(None);
        {
            let mut session = first.lock().await;
            session.phase = Phase::NeedsAssessment;
        }

        let (id2, second) = registry.get_or_create(Some(id.clone()));
        assert_eq!(id, id2);
        assert_eq!(second.lock().await.phase, Phase::NeedsAssessment);
    }

    #[tokio::test]
    async fn test_blank_id_creates_fresh_session() {
        let registry = SessionRegistry::new(30);
        let (a, _) = registry.get_or_create(None);
        let (b, _) = registry.get_or_create(Some("  ".into()));
        assert_ne!(a, b);
        assert_eq!(registry.active_count(), 2);
    }

    #[tokio::test]
    async fn test_expired_session_is_replaced() {
        // Zero TTL: every session is expired by the next call
        let registry = SessionRegistry::new(0);
        let (id, first) = registry.get_or_create(None);
        first.lock().await.phase = Phase::Confirming;

        let (id2, second) = registry.get_or_create(Some(id.clone()));
        assert_eq!(id, id2);
        assert_eq!(second.lock().await.phase, Phase::Greeting);
    }

    #[tokio::test]
    async fn test_turns_serialize_per_session() {
        let registry = SessionRegistry::new(30);
        let (_, session) = registry.get_or_create(None);

        let guard = session.lock().await;
        // A second turn on the same session must wait
        assert!(session.try_lock().is_err());
        drop(guard);
        assert!(session.try_lock().is_ok());
    }
}
