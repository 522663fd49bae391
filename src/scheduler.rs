//! Background sync scheduler
//!
//! Re-runs the sync pipeline for every registered connection on a fixed
//! interval, persisting a new snapshot only when the change detector reports
//! real change. The per-connection loop is intentionally sequential to bound
//! simultaneous load on the source databases and the extraction service; a
//! future scale-up would need an explicit bounded worker pool, not unbounded
//! fan-out.

use crate::analysis::AnalysisService;
use crate::diff::detect_changes;
use crate::error::AppError;
use crate::models::Connection;
use crate::store::{ConnectionStore, SnapshotStore};
use crate::sync::SyncOrchestrator;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct Scheduler {
    interval: Duration,
    connections: Arc<dyn ConnectionStore>,
    snapshots: Arc<dyn SnapshotStore>,
    analysis: Arc<dyn AnalysisService>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl Scheduler {
    pub fn new(
        interval: Duration,
        connections: Arc<dyn ConnectionStore>,
        snapshots: Arc<dyn SnapshotStore>,
        analysis: Arc<dyn AnalysisService>,
        orchestrator: Arc<SyncOrchestrator>,
    ) -> Self {
        Self {
            interval,
            connections,
            snapshots,
            analysis,
            orchestrator,
        }
    }

    /// Run forever. The first tick fires one full interval after startup.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval's first tick completes immediately; consume it so a fresh
        // deploy does not hammer every source database at boot.
        ticker.tick().await;

        info!(interval_secs = self.interval.as_secs(), "Sync scheduler started");
        loop {
            ticker.tick().await;
            // A sweep-level failure is fatal for this tick only.
            if let Err(e) = self.sweep().await {
                error!(error = %e, "Scheduled sweep aborted");
            }
        }
    }

    /// One sweep over all registered connections, sequentially.
    pub async fn sweep(&self) -> Result<(), AppError> {
        let connections = self.connections.list().await?;
        info!(connections = connections.len(), "Starting scheduled sync sweep");

        for connection in connections {
            // Per-connection failures never abort the sweep.
            if let Err(e) = self.sync_one(&connection).await {
                warn!(connection = %connection.id, name = %connection.name, error = %e,
                      "Scheduled sync failed, continuing sweep");
            }
        }
        Ok(())
    }

    async fn sync_one(&self, connection: &Connection) -> Result<(), AppError> {
        let tables = self.analysis.extract(&connection.credentials).await?;

        let previous = match self.snapshots.most_recent(connection.id).await? {
            Some(snapshot) => snapshot,
            None => {
                // Never manually synced: record the visit, create nothing.
                debug!(connection = %connection.id, "No prior snapshot, skipping");
                self.connections
                    .touch_last_synced(connection.id, Utc::now())
                    .await?;
                return Ok(());
            }
        };

        let changes = detect_changes(&previous.tables, &tables);
        if changes.is_empty() {
            debug!(connection = %connection.id, "Schema unchanged");
            self.connections
                .touch_last_synced(connection.id, Utc::now())
                .await?;
            return Ok(());
        }

        info!(
            connection = %connection.id,
            new = changes.new_tables.len(),
            dropped = changes.dropped_tables.len(),
            modified = changes.modified_tables.len(),
            "Schema change detected, creating snapshot"
        );
        self.orchestrator
            .persist_and_analyze(connection, tables, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::sync::tests::{connection, table, MockAnalysis};
    use pretty_assertions::assert_eq;

    struct Fixture {
        store: Arc<MemoryStore>,
        analysis: Arc<MockAnalysis>,
        scheduler: Scheduler,
        orchestrator: Arc<SyncOrchestrator>,
    }

    fn fixture(analysis: MockAnalysis) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let analysis = Arc::new(analysis);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone() as Arc<dyn ConnectionStore>,
            store.clone() as Arc<dyn SnapshotStore>,
            analysis.clone() as Arc<dyn AnalysisService>,
        ));
        let scheduler = Scheduler::new(
            Duration::from_secs(6 * 60 * 60),
            store.clone() as Arc<dyn ConnectionStore>,
            store.clone() as Arc<dyn SnapshotStore>,
            analysis.clone() as Arc<dyn AnalysisService>,
            orchestrator.clone(),
        );
        Fixture {
            store,
            analysis,
            scheduler,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn unchanged_schema_touches_last_synced_without_new_snapshot() {
        let tables = vec![table("orders", 100, 5), table("customers", 50, 3)];
        let fx = fixture(MockAnalysis::returning(tables));
        let conn = fx.store.register(connection()).await.unwrap();

        // Seed an initial snapshot the way a manual sync would.
        let first = fx.orchestrator.run(&conn, None).await.unwrap();
        let synced_at = fx.store.get(conn.id).await.unwrap().unwrap().last_synced_at;

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        fx.scheduler.sweep().await.unwrap();

        // Same snapshot, fresher lastSyncedAt.
        let latest = fx.store.most_recent(conn.id).await.unwrap().unwrap();
        assert_eq!(latest.id, first);
        let conn = fx.store.get(conn.id).await.unwrap().unwrap();
        assert!(conn.last_synced_at > synced_at);
    }

    #[tokio::test]
    async fn changed_schema_creates_chained_snapshot_with_change_record() {
        let fx = fixture(MockAnalysis::returning(vec![
            table("orders", 100, 5),
            table("customers", 50, 3),
        ]));
        let conn = fx.store.register(connection()).await.unwrap();
        let first = fx.orchestrator.run(&conn, None).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        *fx.analysis.extract_result.lock().unwrap() = Ok(vec![
            table("orders", 120, 6),
            table("customers", 50, 3),
            table("products", 10, 2),
        ]);
        fx.scheduler.sweep().await.unwrap();

        let latest = fx.store.most_recent(conn.id).await.unwrap().unwrap();
        assert_ne!(latest.id, first);
        assert_eq!(latest.previous_snapshot_id, Some(first));
        assert_eq!(latest.changes.new_tables, vec!["products".to_string()]);
        assert_eq!(latest.changes.modified_tables, vec!["orders".to_string()]);
        assert!(latest.changes.dropped_tables.is_empty());
    }

    #[tokio::test]
    async fn connection_without_snapshot_is_skipped_but_touched() {
        let fx = fixture(MockAnalysis::returning(vec![table("orders", 100, 5)]));
        let conn = fx.store.register(connection()).await.unwrap();

        fx.scheduler.sweep().await.unwrap();

        assert!(fx.store.most_recent(conn.id).await.unwrap().is_none());
        let conn = fx.store.get(conn.id).await.unwrap().unwrap();
        assert!(conn.last_synced_at.is_some());
        // Quality is only invoked when a snapshot is persisted.
        assert!(fx.analysis.quality_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_connection_does_not_abort_the_sweep() {
        let fx = fixture(MockAnalysis::failing_extraction("timeout"));
        let first = fx.store.register(connection()).await.unwrap();
        let second = fx.store.register(connection()).await.unwrap();

        fx.scheduler.sweep().await.unwrap();

        // The sweep reached both connections despite the first one failing.
        assert_eq!(*fx.analysis.extract_calls.lock().unwrap(), 2);
        let first = fx.store.get(first.id).await.unwrap().unwrap();
        let second = fx.store.get(second.id).await.unwrap().unwrap();
        assert!(first.last_synced_at.is_none());
        assert!(second.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn extraction_failure_leaves_connection_untouched() {
        let fx = fixture(MockAnalysis::failing_extraction("refused"));
        let conn = fx.store.register(connection()).await.unwrap();

        fx.scheduler.sweep().await.unwrap();

        let conn = fx.store.get(conn.id).await.unwrap().unwrap();
        assert!(conn.last_synced_at.is_none());
        assert!(fx.store.most_recent(conn.id).await.unwrap().is_none());
    }
}
