//! Chat sessions. A session id doubles as the thread id of thread memory.
//!
//! Sessions are kept in an LRU bounded like thread memory (`max_threads`),
//! so REST callers that never reuse a thread id cannot grow it without limit.

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const DEFAULT_SESSION: &str = "main";
pub const DEFAULT_MAX_SESSIONS: usize = 1000;
const UNTITLED: &str = "New chat";
const TITLE_CHARS: usize = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: u64,
}

impl Session {
    /// Session first seen through a message; only `main` has a fixed name
    fn untitled(id: &str) -> Self {
        let name = if id == DEFAULT_SESSION { "Main" } else { UNTITLED };
        Self::new(id.to_string(), name)
    }

    fn new(id: String, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.to_string(),
            created_at: now,
            last_activity: now,
            message_count: 0,
        }
    }
}

/// Untitled sessions are named after their first message
fn title_from(message: &str) -> String {
    let line = message.lines().next().unwrap_or("").trim();
    if line.chars().count() <= TITLE_CHARS {
        return line.to_string();
    }
    let clipped: String = line.chars().take(TITLE_CHARS).collect();
    format!("{}…", clipped.trim_end())
}

pub struct SessionManager {
    sessions: RwLock<LruCache<String, Session>>,
}

impl SessionManager {
    /// Starts with the default `main` session
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }

    pub fn with_capacity(max_sessions: usize) -> Self {
        let cap = NonZeroUsize::new(max_sessions.max(1)).unwrap_or(NonZeroUsize::MIN);
        let mut sessions = LruCache::new(cap);
        sessions.put(DEFAULT_SESSION.to_string(), Session::untitled(DEFAULT_SESSION));
        Self {
            sessions: RwLock::new(sessions),
        }
    }

    /// Most recently active first
    pub async fn list(&self) -> Vec<Session> {
        let mut list: Vec<Session> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        list.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        list
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.peek(id).cloned()
    }

    pub async fn create(&self, name: Option<&str>) -> Session {
        let id = uuid::Uuid::new_v4().to_string();
        let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(UNTITLED);
        let session = Session::new(id.clone(), name);
        self.insert(session.clone()).await;
        info!("Created session '{}' ({})", name, id);
        session
    }

    async fn insert(&self, session: Session) {
        let id = session.id.clone();
        if let Some((evicted, _)) = self.sessions.write().await.push(id.clone(), session) {
            if evicted != id {
                debug!("Evicted least recently used session {}", evicted);
            }
        }
    }

    /// Count one user message on `id`, creating the session on first use.
    /// Returns the session and whether it was created.
    pub async fn record_message(&self, id: &str, message: &str) -> (Session, bool) {
        let mut sessions = self.sessions.write().await;
        let created = !sessions.contains(id);
        if created {
            if let Some((evicted, _)) = sessions.push(id.to_string(), Session::untitled(id)) {
                debug!("Evicted least recently used session {}", evicted);
            }
        }
        let Some(session) = sessions.get_mut(id) else {
            return (Session::untitled(id), created);
        };
        if session.message_count == 0 && session.name == UNTITLED {
            session.name = title_from(message);
        }
        session.last_activity = Utc::now();
        session.message_count += 1;
        debug!("Session '{}' now has {} message(s)", id, session.message_count);
        (session.clone(), created)
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn capacity(&self) -> usize {
        self.sessions.read().await.cap().get()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_and_create() {
        let mgr = SessionManager::new();
        assert_eq!(mgr.list().await[0].id, DEFAULT_SESSION);

        let s = mgr.create(Some("  ")).await;
        assert_eq!(s.name, UNTITLED);
        assert_eq!(mgr.count().await, 2);
        assert!(mgr.get(&s.id).await.is_some());
        assert!(mgr.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_record_message_names_untitled_sessions() {
        let mgr = SessionManager::new();
        let s = mgr.create(None).await;
        let (named, created) = mgr
            .record_message(&s.id, "Show me the budget variance for every department this quarter")
            .await;
        assert!(!created);
        assert_eq!(named.name, "Show me the budget variance for every de…");
        assert_eq!(named.message_count, 1);

        let (again, _) = mgr.record_message(&s.id, "and last quarter?").await;
        assert_eq!(again.name, named.name);

        let (main, _) = mgr.record_message(DEFAULT_SESSION, "hello").await;
        assert_eq!(main.name, "Main");

        let (fresh, created) = mgr.record_message("thread-9", "where is order 12?").await;
        assert!(created);
        assert_eq!(fresh.name, "where is order 12?");
    }

    #[tokio::test]
    async fn test_list_sorted_by_activity() {
        let mgr = SessionManager::new();
        let older = mgr.create(Some("Older")).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let newer = mgr.create(Some("Newer")).await;
        assert_eq!(mgr.list().await[0].id, newer.id);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        mgr.record_message(&older.id, "bump").await;
        assert_eq!(mgr.list().await[0].id, older.id);
    }

    #[tokio::test]
    async fn test_sessions_stay_within_capacity() {
        let mgr = SessionManager::with_capacity(3);
        for i in 0..10 {
            let (_, created) = mgr.record_message(&format!("rest-{}", i), "hi").await;
            assert!(created);
            assert!(mgr.count().await <= 3);
        }
        assert_eq!(mgr.count().await, 3);
        assert!(mgr.get("rest-0").await.is_none());
        assert!(mgr.get("rest-9").await.is_some());

        // an evicted session comes back as a new one
        let (_, created) = mgr.record_message("rest-0", "again").await;
        assert!(created);
        assert_eq!(mgr.count().await, 3);
    }

    #[tokio::test]
    async fn test_recent_activity_protects_a_session() {
        let mgr = SessionManager::with_capacity(2);
        mgr.record_message("a", "first").await;
        mgr.record_message(DEFAULT_SESSION, "keep main warm").await;
        mgr.record_message("b", "pushes out a").await;
        assert!(mgr.get("a").await.is_none());
        let main = mgr.get(DEFAULT_SESSION).await.unwrap();
        assert_eq!(main.name, "Main");
        assert_eq!(main.message_count, 1);
    }
}
