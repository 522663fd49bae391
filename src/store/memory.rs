//! In-memory store
//!
//! Backs development mode and tests. Same `Arc<RwLock<HashMap>>` shape as the
//! rest of the process-wide state; not shared across processes.

use super::{ConnectionStore, NewSnapshot, SnapshotStore};
use crate::error::AppError;
use crate::models::{Connection, Snapshot, TableSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    connections: Arc<RwLock<HashMap<Uuid, Connection>>>,
    snapshots: Arc<RwLock<HashMap<Uuid, Snapshot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn register(&self, connection: Connection) -> Result<Connection, AppError> {
        let mut connections = self.connections.write().await;
        connections.insert(connection.id, connection.clone());
        Ok(connection)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Connection>, AppError> {
        let connections = self.connections.read().await;
        Ok(connections.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Connection>, AppError> {
        let connections = self.connections.read().await;
        let mut all: Vec<_> = connections.values().cloned().collect();
        all.sort_by_key(|c| c.created_at);
        Ok(all)
    }

    async fn touch_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Connection {} not found", id)))?;
        connection.last_synced_at = Some(at);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut connections = self.connections.write().await;
        Ok(connections.remove(&id).is_some())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn create(&self, new: NewSnapshot) -> Result<Snapshot, AppError> {
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            connection_id: new.connection_id,
            db_kind: new.db_kind,
            table_count: new.tables.len(),
            total_rows: Snapshot::total_rows_of(&new.tables),
            extracted_at: Utc::now(),
            previous_snapshot_id: new.previous_snapshot_id,
            changes: new.changes,
            tables: new.tables,
        };

        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.id, snapshot.clone());
        Ok(snapshot)
    }

    async fn update_tables(
        &self,
        snapshot_id: Uuid,
        tables: Vec<TableSummary>,
    ) -> Result<Snapshot, AppError> {
        let mut snapshots = self.snapshots.write().await;
        let snapshot = snapshots
            .get_mut(&snapshot_id)
            .ok_or_else(|| AppError::NotFound(format!("Snapshot {} not found", snapshot_id)))?;

        // Only creation stamps extractedAt; re-stamping here would push a
        // refreshed older snapshot past its successor and break chain order.
        snapshot.table_count = tables.len();
        snapshot.total_rows = Snapshot::total_rows_of(&tables);
        snapshot.tables = tables;
        Ok(snapshot.clone())
    }

    async fn most_recent(&self, connection_id: Uuid) -> Result<Option<Snapshot>, AppError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .values()
            .filter(|s| s.connection_id == connection_id)
            .max_by_key(|s| s.extracted_at)
            .cloned())
    }

    async fn find(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>, AppError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&snapshot_id).cloned())
    }

    async fn delete_for_connection(&self, connection_id: Uuid) -> Result<usize, AppError> {
        let mut snapshots = self.snapshots.write().await;
        let doomed: Vec<Uuid> = snapshots
            .values()
            .filter(|s| s.connection_id == connection_id)
            .map(|s| s.id)
            .collect();
        for id in &doomed {
            snapshots.remove(id);
        }
        Ok(doomed.len())
    }
}
