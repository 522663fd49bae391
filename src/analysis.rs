//! Analysis service boundary
//!
//! The extraction, quality, doc-generation and question-answering
//! collaborators all live in one external HTTP service. This module defines
//! the trait the core programs against and the reqwest-backed client that
//! speaks the service's wire contract. Internals of those capabilities are
//! out of scope here; they are opaque request/response calls.

use crate::config::AnalysisConfig;
use crate::error::AppError;
use crate::models::{Credentials, TableSummary};
use crate::session::ChatTurn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Extraction response. The service also sends a `tableCount`, redundant
/// with the list length; serde drops it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub tables: Vec<TableSummary>,
}

/// Doc-generation progress, polled by snapshot id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub status: JobState,
    pub progress: u64,
    pub total: u64,
    #[serde(default)]
    pub current_table: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotStarted,
    Running,
    Complete,
    Failed,
}

/// Source table cited by a chat answer, with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTable {
    pub table: String,
    #[serde(default)]
    pub score: f64,
}

/// Answer from the question-answering collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(default)]
    pub source_tables: Vec<SourceTable>,
}

/// The analysis service as consumed by the sync pipeline and chat handler.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Extract the current schema of the target database.
    async fn extract(&self, credentials: &Credentials) -> Result<Vec<TableSummary>, AppError>;

    /// Run quality analysis for a snapshot. Scores are written back into the
    /// snapshot out-of-band by the service; only the acknowledgement matters.
    async fn run_quality(
        &self,
        snapshot_id: Uuid,
        credentials: &Credentials,
    ) -> Result<(), AppError>;

    /// Kick off background AI documentation generation for a snapshot.
    /// Progress is observable only through [`AnalysisService::job_status`].
    async fn dispatch_doc_generation(&self, snapshot_id: Uuid) -> Result<(), AppError>;

    /// Poll doc-generation progress for a snapshot.
    async fn job_status(&self, snapshot_id: Uuid) -> Result<JobStatus, AppError>;

    /// Ask a question against a snapshot, with a bounded history window as
    /// conversational context.
    async fn chat(
        &self,
        question: &str,
        snapshot_id: Uuid,
        history: &[ChatTurn],
    ) -> Result<ChatAnswer, AppError>;
}

/// HTTP client for the analysis service.
pub struct AnalysisClient {
    http: reqwest::Client,
    /// Separate client for chat: generative answers need a longer timeout.
    chat_http: reqwest::Client,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let chat_http = reqwest::Client::builder()
            .timeout(config.chat_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build chat HTTP client: {}", e)))?;

        Ok(Self {
            http,
            chat_http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Collapse a response into Ok(body) or Err(upstream detail text).
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, String> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or(body);
        Err(format!("{}: {}", status, detail))
    }
}

#[async_trait]
impl AnalysisService for AnalysisClient {
    async fn extract(&self, credentials: &Credentials) -> Result<Vec<TableSummary>, AppError> {
        let response = self
            .http
            .post(self.url("/extract"))
            .json(credentials)
            .send()
            .await
            .map_err(|e| AppError::UpstreamExtraction(e.to_string()))?;

        let response = Self::check(response)
            .await
            .map_err(AppError::UpstreamExtraction)?;

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamExtraction(format!("Invalid response: {}", e)))?;

        Ok(body.tables)
    }

    async fn run_quality(
        &self,
        snapshot_id: Uuid,
        credentials: &Credentials,
    ) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url(&format!("/quality/{}", snapshot_id)))
            .json(credentials)
            .send()
            .await
            .map_err(|e| AppError::UpstreamQuality(e.to_string()))?;

        Self::check(response).await.map_err(AppError::UpstreamQuality)?;
        Ok(())
    }

    async fn dispatch_doc_generation(&self, snapshot_id: Uuid) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.url(&format!("/generate-docs/{}", snapshot_id)))
            .send()
            .await
            .map_err(|e| AppError::DocGenDispatch(e.to_string()))?;

        Self::check(response).await.map_err(AppError::DocGenDispatch)?;
        Ok(())
    }

    async fn job_status(&self, snapshot_id: Uuid) -> Result<JobStatus, AppError> {
        let response = self
            .http
            .get(self.url(&format!("/job-status/{}", snapshot_id)))
            .send()
            .await
            .map_err(|e| AppError::DocGenDispatch(e.to_string()))?;

        let response = Self::check(response).await.map_err(AppError::DocGenDispatch)?;
        response
            .json()
            .await
            .map_err(|e| AppError::DocGenDispatch(format!("Invalid response: {}", e)))
    }

    async fn chat(
        &self,
        question: &str,
        snapshot_id: Uuid,
        history: &[ChatTurn],
    ) -> Result<ChatAnswer, AppError> {
        let response = self
            .chat_http
            .post(self.url("/chat"))
            .json(&json!({
                "question": question,
                "snapshotId": snapshot_id,
                "history": history,
            }))
            .send()
            .await
            .map_err(|e| AppError::UpstreamChat(e.to_string()))?;

        let response = Self::check(response).await.map_err(AppError::UpstreamChat)?;
        response
            .json()
            .await
            .map_err(|e| AppError::UpstreamChat(format!("Invalid response: {}", e)))
    }
}
