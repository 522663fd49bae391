//! Chat session history
//!
//! Bounded, per-session conversational memory for the question-answering
//! collaborator. Sessions are keyed by an opaque id minted on first use, live
//! only for process uptime, and keep at most the configured number of
//! most-recent turns (oldest evicted first).
//!
//! The store is an injected abstraction rather than ambient module state so a
//! persistent or distributed implementation can be swapped in later without
//! touching call sites.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Session store abstraction: get-or-create, append with eviction, and the
/// most-recent window.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the supplied session id, or mint a fresh one.
    async fn get_or_create(&self, session_id: Option<String>) -> String;

    /// Append a turn; evict oldest turns past the cap.
    async fn append(&self, session_id: &str, turn: ChatTurn);

    /// Most-recent turns for a session, at most the cap's worth, oldest first.
    /// Unknown sessions yield an empty window.
    async fn window(&self, session_id: &str) -> Vec<ChatTurn>;
}

/// In-memory session store.
///
/// Single-process only: concurrent writers to the same session id can
/// interleave append order, which is acceptable in the single-writer-per-
/// session deployment model.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, VecDeque<ChatTurn>>>>,
    cap: usize,
}

impl InMemorySessionStore {
    pub fn new(cap: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            cap,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, session_id: Option<String>) -> String {
        match session_id {
            Some(id) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        }
    }

    async fn append(&self, session_id: &str, turn: ChatTurn) {
        let mut sessions = self.sessions.write().await;
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push_back(turn);
        while history.len() > self.cap {
            history.pop_front();
        }
    }

    async fn window(&self, session_id: &str) -> Vec<ChatTurn> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}
