//! Persistence layer
//!
//! Connection and snapshot stores behind async traits, with an in-memory
//! implementation for development and tests and a PostgreSQL implementation
//! for deployment. Snapshots are append-only and chained to their predecessor
//! via `previous_snapshot_id`; the only in-place mutation is the explicit
//! re-extraction refresh.
//!
//! No concurrency control beyond the storage layer's own atomic single-record
//! writes: the design assumes one orchestrator run at a time per connection.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppError;
use crate::models::{Connection, DbKind, SchemaChanges, Snapshot, TableSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Input for creating a snapshot. Aggregates (`tableCount`, `totalRows`) and
/// `extractedAt` are computed by the store at creation time.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub connection_id: Uuid,
    pub db_kind: DbKind,
    pub tables: Vec<TableSummary>,
    pub previous_snapshot_id: Option<Uuid>,
    pub changes: SchemaChanges,
}

/// Registered connection records.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn register(&self, connection: Connection) -> Result<Connection, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Connection>, AppError>;

    async fn list(&self) -> Result<Vec<Connection>, AppError>;

    /// Record a completed (or intentionally skipped) sync attempt.
    async fn touch_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Remove a connection. The caller cascades snapshot deletion via
    /// [`SnapshotStore::delete_for_connection`].
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Versioned schema snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a new snapshot. Computes aggregates, stamps `extractedAt`.
    /// Fails only when storage itself is unavailable.
    async fn create(&self, new: NewSnapshot) -> Result<Snapshot, AppError>;

    /// Re-extraction path: replace the table list of an existing snapshot in
    /// place and recompute aggregates. `extractedAt` keeps its creation value
    /// so the chain order is stable. `NotFound` if the id is unknown.
    async fn update_tables(
        &self,
        snapshot_id: Uuid,
        tables: Vec<TableSummary>,
    ) -> Result<Snapshot, AppError>;

    /// The snapshot with the latest `extractedAt` for a connection, if any.
    async fn most_recent(&self, connection_id: Uuid) -> Result<Option<Snapshot>, AppError>;

    async fn find(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>, AppError>;

    /// Cascade: remove every snapshot of a deleted connection. Returns the
    /// number removed.
    async fn delete_for_connection(&self, connection_id: Uuid) -> Result<usize, AppError>;
}
