//! Per-session conversation state keyed by an opaque session id.
//!
//! The map itself sits behind a mutex held only for lookup/insert.  Each
//! session has its own async mutex that the caller holds for the whole
//! turn (prompt build → model call → history append), so two requests on
//! the same session are serialised and history stays in arrival order,
//! while different sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

/// One session slot.
#[derive(Debug)]
pub struct Session<S> {
    pub created_at: DateTime<Utc>,
    pub state: S,
}

impl<S> Session<S> {
    /// Whole seconds since the session was created.
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.created_at).num_seconds()
    }
}

pub type SharedSession<S> = Arc<Mutex<Session<S>>>;

#[derive(Debug)]
pub struct SessionMap<S> {
    sessions: Mutex<HashMap<String, SharedSession<S>>>,
}

impl<S> Default for SessionMap<S> {
    fn default() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }
}

impl<S: Default> SessionMap<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing session `id`, or a fresh default one registered under it.
    pub async fn get_or_create(&self, id: &str) -> SharedSession<S> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, "session created");
                Arc::new(Mutex::new(Session { created_at: Utc::now(), state: S::default() }))
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.lock().await.contains_key(id)
    }
}

/// A new random session id.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}
