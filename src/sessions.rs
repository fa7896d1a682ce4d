use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::llm::Message;

/// One visitor's conversation state.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_name: Option<String>,
    pub location: Option<String>,
    pub turns: Vec<Message>,
    pub last_active: i64,
}

/// True when a session has been idle past the TTL. Pure so expiry is
/// testable without a clock.
fn expired(session: &Session, now: i64, ttl_secs: i64) -> bool {
    now - session.last_active > ttl_secs
}

/// Registry of active conversations, garbage-collected lazily on access.
/// Mutation only happens through the lock; interleaved async callers see
/// consistent state.
pub struct SessionRegistry {
    ttl_secs: i64,
    inner: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn sweep(map: &mut HashMap<String, Session>, now: i64, ttl_secs: i64) {
        let before = map.len();
        map.retain(|_, s| !expired(s, now, ttl_secs));
        let removed = before - map.len();
        if removed > 0 {
            debug!(removed, remaining = map.len(), "expired sessions collected");
        }
    }

    pub async fn create(
        &self,
        user_name: Option<String>,
        location: Option<String>,
        now: i64,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut map = self.inner.write().await;
        Self::sweep(&mut map, now, self.ttl_secs);
        let session = Session {
            id: id.clone(),
            user_name,
            location,
            turns: Vec::new(),
            last_active: now,
        };
        debug!(
            session = %session.id,
            name = ?session.user_name,
            location = ?session.location,
            "session created"
        );
        map.insert(id.clone(), session);
        id
    }

    /// Conversation history for a session, refreshing its activity clock.
    /// `None` when the id is unknown or already expired.
    pub async fn history(&self, id: &str, now: i64) -> Option<Vec<Message>> {
        let mut map = self.inner.write().await;
        Self::sweep(&mut map, now, self.ttl_secs);
        let session = map.get_mut(id)?;
        session.last_active = now;
        Some(session.turns.clone())
    }

    /// Record one question/answer exchange.
    pub async fn append_exchange(&self, id: &str, user: &str, assistant: &str, now: i64) {
        let mut map = self.inner.write().await;
        if let Some(session) = map.get_mut(id) {
            session.turns.push(Message::user(user));
            session.turns.push(Message::assistant(assistant));
            session.last_active = now;
        }
    }

    pub async fn greeting(&self, id: &str) -> Option<String> {
        let map = self.inner.read().await;
        let session = map.get(id)?;
        Some(match &session.user_name {
            Some(name) => format!("Hi {}, I'm Terah the retirement bot!", name),
            None => "Hi, I'm Terah the retirement bot!".to_string(),
        })
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
