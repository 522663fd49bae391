//! Sync Orchestrator
//!
//! Drives one synchronization run for a connection: extract the schema via
//! the analysis service, persist a versioned snapshot (or refresh an existing
//! one in place), run quality analysis synchronously, then dispatch AI doc
//! generation as a detached background task. The call returns the snapshot id
//! as soon as the doc-gen dispatch is issued; it never waits on generation.
//!
//! Two concurrent runs for the same connection are not mutually excluded:
//! both may persist snapshots chained to the same predecessor. Accepted under
//! the single-writer-per-connection deployment assumption.

use crate::analysis::AnalysisService;
use crate::diff::detect_changes;
use crate::error::AppError;
use crate::models::{Connection, SchemaChanges, TableSummary};
use crate::store::{ConnectionStore, NewSnapshot, SnapshotStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pipeline phase, for logging. `Failed` is reachable from `Extracting`,
/// `Persisting` and `AnalyzingQuality`; doc-gen dispatch failures are
/// logged-only and never fail the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Extracting,
    Persisting,
    AnalyzingQuality,
    DocGenTriggered,
    Done,
    Failed,
}

pub struct SyncOrchestrator {
    connections: Arc<dyn ConnectionStore>,
    snapshots: Arc<dyn SnapshotStore>,
    analysis: Arc<dyn AnalysisService>,
}

impl SyncOrchestrator {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        snapshots: Arc<dyn SnapshotStore>,
        analysis: Arc<dyn AnalysisService>,
    ) -> Self {
        Self {
            connections,
            snapshots,
            analysis,
        }
    }

    /// Full manual sync: extract, then persist/analyze/dispatch.
    ///
    /// With `refresh_snapshot_id` the extraction result replaces that
    /// snapshot's table list in place instead of creating a new version.
    /// Extraction failure leaves storage and `lastSyncedAt` untouched.
    pub async fn run(
        &self,
        connection: &Connection,
        refresh_snapshot_id: Option<Uuid>,
    ) -> Result<Uuid, AppError> {
        debug!(connection = %connection.id, phase = ?SyncPhase::Extracting, "Starting sync");

        let tables = self
            .analysis
            .extract(&connection.credentials)
            .await
            .map_err(|e| {
                warn!(connection = %connection.id, phase = ?SyncPhase::Failed, error = %e,
                      "Schema extraction failed");
                e
            })?;

        self.persist_and_analyze(connection, tables, refresh_snapshot_id)
            .await
    }

    /// Steps 2-4 of the pipeline: persist, quality, fire-and-forget doc-gen.
    /// The scheduler enters here directly after its own extraction and change
    /// check.
    pub async fn persist_and_analyze(
        &self,
        connection: &Connection,
        tables: Vec<TableSummary>,
        refresh_snapshot_id: Option<Uuid>,
    ) -> Result<Uuid, AppError> {
        debug!(connection = %connection.id, phase = ?SyncPhase::Persisting,
               tables = tables.len(), "Persisting snapshot");

        let snapshot_id = match refresh_snapshot_id {
            Some(id) => self.snapshots.update_tables(id, tables).await?.id,
            None => {
                let previous = self.snapshots.most_recent(connection.id).await?;
                let changes = match &previous {
                    Some(prev) => detect_changes(&prev.tables, &tables),
                    None => SchemaChanges::all_new(&tables),
                };
                let snapshot = self
                    .snapshots
                    .create(NewSnapshot {
                        connection_id: connection.id,
                        db_kind: connection.credentials.db_type,
                        tables,
                        previous_snapshot_id: previous.map(|p| p.id),
                        changes,
                    })
                    .await?;
                snapshot.id
            }
        };

        // The snapshot is in; from here on the sync attempt counts.
        self.connections
            .touch_last_synced(connection.id, Utc::now())
            .await?;

        debug!(snapshot = %snapshot_id, phase = ?SyncPhase::AnalyzingQuality, "Running quality analysis");
        self.analysis
            .run_quality(snapshot_id, &connection.credentials)
            .await
            .map_err(|e| {
                // Recoverable partial state: schema persisted, quality absent.
                // No rollback; a later sync retries.
                warn!(snapshot = %snapshot_id, phase = ?SyncPhase::Failed, error = %e,
                      "Quality analysis failed, snapshot retained");
                e
            })?;

        debug!(snapshot = %snapshot_id, phase = ?SyncPhase::DocGenTriggered, "Dispatching doc generation");
        let analysis = Arc::clone(&self.analysis);
        tokio::spawn(async move {
            if let Err(e) = analysis.dispatch_doc_generation(snapshot_id).await {
                // Best-effort: outcome is only observable via job-status polling.
                warn!(snapshot = %snapshot_id, error = %e, "Doc generation dispatch failed");
            }
        });

        info!(connection = %connection.id, snapshot = %snapshot_id, phase = ?SyncPhase::Done,
              "Sync complete");
        Ok(snapshot_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::{ChatAnswer, JobState, JobStatus};
    use crate::models::{ColumnSummary, Credentials, DbKind};
    use crate::session::ChatTurn;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Scripted analysis service for pipeline tests.
    pub(crate) struct MockAnalysis {
        pub extract_result: Mutex<Result<Vec<TableSummary>, String>>,
        pub extract_calls: Mutex<usize>,
        pub fail_quality: bool,
        pub fail_doc_gen: bool,
        pub quality_calls: Mutex<Vec<Uuid>>,
        pub doc_gen_calls: Mutex<Vec<Uuid>>,
        pub chat_requests: Mutex<Vec<(String, Vec<ChatTurn>)>>,
    }

    impl MockAnalysis {
        pub(crate) fn returning(tables: Vec<TableSummary>) -> Self {
            Self {
                extract_result: Mutex::new(Ok(tables)),
                extract_calls: Mutex::new(0),
                fail_quality: false,
                fail_doc_gen: false,
                quality_calls: Mutex::new(Vec::new()),
                doc_gen_calls: Mutex::new(Vec::new()),
                chat_requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing_extraction(detail: &str) -> Self {
            let mock = Self::returning(vec![]);
            *mock.extract_result.lock().unwrap() = Err(detail.to_string());
            mock
        }
    }

    #[async_trait]
    impl AnalysisService for MockAnalysis {
        async fn extract(&self, _credentials: &Credentials) -> Result<Vec<TableSummary>, AppError> {
            *self.extract_calls.lock().unwrap() += 1;
            self.extract_result
                .lock()
                .unwrap()
                .clone()
                .map_err(AppError::UpstreamExtraction)
        }

        async fn run_quality(
            &self,
            snapshot_id: Uuid,
            _credentials: &Credentials,
        ) -> Result<(), AppError> {
            self.quality_calls.lock().unwrap().push(snapshot_id);
            if self.fail_quality {
                return Err(AppError::UpstreamQuality("sampling failed".to_string()));
            }
            Ok(())
        }

        async fn dispatch_doc_generation(&self, snapshot_id: Uuid) -> Result<(), AppError> {
            self.doc_gen_calls.lock().unwrap().push(snapshot_id);
            if self.fail_doc_gen {
                return Err(AppError::DocGenDispatch("service down".to_string()));
            }
            Ok(())
        }

        async fn job_status(&self, _snapshot_id: Uuid) -> Result<JobStatus, AppError> {
            Ok(JobStatus {
                status: JobState::NotStarted,
                progress: 0,
                total: 0,
                current_table: String::new(),
            })
        }

        async fn chat(
            &self,
            question: &str,
            _snapshot_id: Uuid,
            history: &[ChatTurn],
        ) -> Result<ChatAnswer, AppError> {
            self.chat_requests
                .lock()
                .unwrap()
                .push((question.to_string(), history.to_vec()));
            Ok(ChatAnswer {
                answer: format!("answer to: {}", question),
                source_tables: vec![],
            })
        }
    }

    pub(crate) fn table(name: &str, rows: i64, columns: usize) -> TableSummary {
        TableSummary {
            name: name.to_string(),
            row_count: Some(rows),
            size_bytes: Some(1024),
            columns: (0..columns)
                .map(|i| ColumnSummary {
                    name: format!("c{}", i),
                    data_type: "text".to_string(),
                    is_nullable: true,
                })
                .collect(),
        }
    }

    pub(crate) fn connection() -> Connection {
        Connection {
            id: Uuid::new_v4(),
            name: "warehouse".to_string(),
            credentials: Credentials {
                db_type: DbKind::Postgres,
                host: Some("localhost".to_string()),
                port: Some(5432),
                database: Some("shop".to_string()),
                username: Some("lens".to_string()),
                password: Some("pw".to_string()),
                account: None,
                warehouse: None,
                schema_name: None,
            },
            created_at: Utc::now(),
            last_synced_at: None,
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        analysis: Arc<MockAnalysis>,
        orchestrator: SyncOrchestrator,
    }

    fn fixture(analysis: MockAnalysis) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let analysis = Arc::new(analysis);
        let orchestrator = SyncOrchestrator::new(
            store.clone() as Arc<dyn ConnectionStore>,
            store.clone() as Arc<dyn SnapshotStore>,
            analysis.clone() as Arc<dyn AnalysisService>,
        );
        Fixture {
            store,
            analysis,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn first_sync_creates_snapshot_with_all_tables_new() {
        let fx = fixture(MockAnalysis::returning(vec![
            table("orders", 100, 5),
            table("customers", 50, 3),
        ]));
        let conn = fx.store.register(connection()).await.unwrap();

        let snapshot_id = fx.orchestrator.run(&conn, None).await.unwrap();

        let snapshot = fx.store.find(snapshot_id).await.unwrap().unwrap();
        assert_eq!(snapshot.previous_snapshot_id, None);
        assert_eq!(
            snapshot.changes.new_tables,
            vec!["customers".to_string(), "orders".to_string()]
        );
        assert!(snapshot.changes.dropped_tables.is_empty());
        assert_eq!(snapshot.table_count, 2);
        assert_eq!(snapshot.total_rows, 150);

        // Quality ran synchronously against the new snapshot.
        assert_eq!(*fx.analysis.quality_calls.lock().unwrap(), vec![snapshot_id]);

        // lastSyncedAt was bumped.
        let conn = fx.store.get(conn.id).await.unwrap().unwrap();
        assert!(conn.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn second_sync_chains_to_previous_snapshot() {
        let fx = fixture(MockAnalysis::returning(vec![table("orders", 100, 5)]));
        let conn = fx.store.register(connection()).await.unwrap();

        let first = fx.orchestrator.run(&conn, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;

        *fx.analysis.extract_result.lock().unwrap() =
            Ok(vec![table("orders", 100, 6), table("products", 10, 2)]);
        let second = fx.orchestrator.run(&conn, None).await.unwrap();

        let snapshot = fx.store.find(second).await.unwrap().unwrap();
        assert_eq!(snapshot.previous_snapshot_id, Some(first));
        assert_eq!(snapshot.changes.new_tables, vec!["products".to_string()]);
        assert_eq!(snapshot.changes.modified_tables, vec!["orders".to_string()]);
    }

    #[tokio::test]
    async fn extraction_failure_persists_nothing_and_leaves_last_synced_unchanged() {
        let fx = fixture(MockAnalysis::failing_extraction("connection refused"));
        let conn = fx.store.register(connection()).await.unwrap();

        let result = fx.orchestrator.run(&conn, None).await;
        assert!(matches!(result, Err(AppError::UpstreamExtraction(_))));

        assert!(fx.store.most_recent(conn.id).await.unwrap().is_none());
        let conn = fx.store.get(conn.id).await.unwrap().unwrap();
        assert!(conn.last_synced_at.is_none());
        assert!(fx.analysis.quality_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn quality_failure_surfaces_but_snapshot_is_retained() {
        let mut analysis = MockAnalysis::returning(vec![table("orders", 10, 2)]);
        analysis.fail_quality = true;
        let fx = fixture(analysis);
        let conn = fx.store.register(connection()).await.unwrap();

        let result = fx.orchestrator.run(&conn, None).await;
        assert!(matches!(result, Err(AppError::UpstreamQuality(_))));

        // Partial state: snapshot persisted, lastSyncedAt bumped, no rollback.
        let snapshot = fx.store.most_recent(conn.id).await.unwrap();
        assert!(snapshot.is_some());
        let conn = fx.store.get(conn.id).await.unwrap().unwrap();
        assert!(conn.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn doc_gen_dispatch_failure_does_not_fail_the_sync() {
        let mut analysis = MockAnalysis::returning(vec![table("orders", 10, 2)]);
        analysis.fail_doc_gen = true;
        let fx = fixture(analysis);
        let conn = fx.store.register(connection()).await.unwrap();

        let snapshot_id = fx.orchestrator.run(&conn, None).await.unwrap();

        // Give the detached dispatch task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(*fx.analysis.doc_gen_calls.lock().unwrap(), vec![snapshot_id]);
        assert!(fx.store.find(snapshot_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn refresh_updates_snapshot_in_place() {
        let fx = fixture(MockAnalysis::returning(vec![table("orders", 10, 2)]));
        let conn = fx.store.register(connection()).await.unwrap();

        let original = fx.orchestrator.run(&conn, None).await.unwrap();

        *fx.analysis.extract_result.lock().unwrap() =
            Ok(vec![table("orders", 25, 2), table("invoices", 5, 3)]);
        let refreshed = fx.orchestrator.run(&conn, Some(original)).await.unwrap();

        assert_eq!(refreshed, original);
        let snapshot = fx.store.find(original).await.unwrap().unwrap();
        assert_eq!(snapshot.table_count, 2);
        assert_eq!(snapshot.total_rows, 30);
        // Still the only snapshot for the connection.
        assert_eq!(
            fx.store.most_recent(conn.id).await.unwrap().unwrap().id,
            original
        );
    }

    #[tokio::test]
    async fn refresh_of_unknown_snapshot_is_not_found() {
        let fx = fixture(MockAnalysis::returning(vec![table("orders", 10, 2)]));
        let conn = fx.store.register(connection()).await.unwrap();

        let result = fx.orchestrator.run(&conn, Some(Uuid::new_v4())).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
