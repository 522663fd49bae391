//! Chat over a snapshot
//!
//! Glue between the session history store and the question-answering
//! collaborator. Each call sends the session's bounded history window as
//! conversational context, then records both the question and the answer so
//! the *next* call sees them.

use crate::analysis::{AnalysisService, SourceTable};
use crate::error::AppError;
use crate::session::{ChatRole, ChatTurn, SessionStore};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub session_id: String,
    pub answer: String,
    pub source_tables: Vec<SourceTable>,
}

pub struct ChatService {
    sessions: Arc<dyn SessionStore>,
    analysis: Arc<dyn AnalysisService>,
}

impl ChatService {
    pub fn new(sessions: Arc<dyn SessionStore>, analysis: Arc<dyn AnalysisService>) -> Self {
        Self { sessions, analysis }
    }

    /// Answer a question against a snapshot's documentation.
    ///
    /// The history window is taken before the current question is appended,
    /// so the collaborator sees prior turns only. On upstream failure nothing
    /// is appended; the failed exchange leaves no trace in the session.
    pub async fn ask(
        &self,
        session_id: Option<String>,
        question: &str,
        snapshot_id: Uuid,
    ) -> Result<ChatReply, AppError> {
        let session_id = self.sessions.get_or_create(session_id).await;
        let history = self.sessions.window(&session_id).await;

        let answer = self.analysis.chat(question, snapshot_id, &history).await?;

        self.sessions
            .append(&session_id, ChatTurn::new(ChatRole::User, question))
            .await;
        self.sessions
            .append(&session_id, ChatTurn::new(ChatRole::Assistant, answer.answer.clone()))
            .await;

        Ok(ChatReply {
            session_id,
            answer: answer.answer,
            source_tables: answer.source_tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;
    use crate::sync::tests::MockAnalysis;
    use pretty_assertions::assert_eq;

    fn service(analysis: Arc<MockAnalysis>) -> ChatService {
        ChatService::new(
            Arc::new(InMemorySessionStore::new(20)),
            analysis as Arc<dyn AnalysisService>,
        )
    }

    #[tokio::test]
    async fn window_sent_upstream_excludes_the_current_question() {
        let analysis = Arc::new(MockAnalysis::returning(vec![]));
        let chat = service(analysis.clone());
        let snapshot_id = Uuid::new_v4();

        let first = chat.ask(None, "what stores orders?", snapshot_id).await.unwrap();
        let _second = chat
            .ask(Some(first.session_id.clone()), "and customers?", snapshot_id)
            .await
            .unwrap();

        let requests = analysis.chat_requests.lock().unwrap();
        // First call: empty window.
        assert!(requests[0].1.is_empty());
        // Second call: exactly the first exchange, not the question being asked.
        assert_eq!(requests[1].1.len(), 2);
        assert_eq!(requests[1].1[0].content, "what stores orders?");
        assert_eq!(requests[1].0, "and customers?");
    }

    #[tokio::test]
    async fn both_turns_are_recorded_after_an_answer() {
        let analysis = Arc::new(MockAnalysis::returning(vec![]));
        let sessions = Arc::new(InMemorySessionStore::new(20));
        let chat = ChatService::new(sessions.clone(), analysis as Arc<dyn AnalysisService>);

        let reply = chat
            .ask(None, "how many tables?", Uuid::new_v4())
            .await
            .unwrap();

        let window = sessions.window(&reply.session_id).await;
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, ChatRole::User);
        assert_eq!(window[1].role, ChatRole::Assistant);
        assert_eq!(window[1].content, reply.answer);
    }

}
