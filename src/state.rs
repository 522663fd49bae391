//! Application state management
//!
//! Shared state accessible across all handlers and the scheduler. Stores and
//! collaborators are held behind trait objects so the in-memory and Postgres
//! backends (and test doubles) are interchangeable.

use crate::analysis::AnalysisService;
use crate::chat::ChatService;
use crate::session::SessionStore;
use crate::store::{ConnectionStore, SnapshotStore};
use crate::sync::SyncOrchestrator;
use std::sync::Arc;

pub struct AppState {
    pub connections: Arc<dyn ConnectionStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub analysis: Arc<dyn AnalysisService>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        snapshots: Arc<dyn SnapshotStore>,
        analysis: Arc<dyn AnalysisService>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&connections),
            Arc::clone(&snapshots),
            Arc::clone(&analysis),
        ));
        let chat = ChatService::new(sessions, Arc::clone(&analysis));

        Self {
            connections,
            snapshots,
            analysis,
            orchestrator,
            chat,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
