//! PostgreSQL-backed store
//!
//! Deployment persistence for connections and snapshots. Table lists and
//! change records are stored as JSONB; the quality/AI enrichment written by
//! the analysis service lands in the same snapshot rows out-of-band.

use super::{ConnectionStore, NewSnapshot, SnapshotStore};
use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::models::{Connection, Credentials, DbKind, Snapshot, TableSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};
use tracing::info;
use uuid::Uuid;

pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Create the pool and make sure the schema exists.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.user = Some(config.user.clone());
        cfg.password = Some(config.password.clone());
        cfg.dbname = Some(config.database.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::Storage(format!("Failed to create pool: {}", e)))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn client(&self) -> Result<deadpool_postgres::Client, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Storage(format!("Database pool error: {}", e)))
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        let client = self.client().await?;

        client
            .execute(
                "CREATE TABLE IF NOT EXISTS connections (
                    id UUID PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    db_type VARCHAR(50) NOT NULL,
                    host VARCHAR(255),
                    port INTEGER,
                    database VARCHAR(255),
                    username VARCHAR(255),
                    password TEXT,
                    account VARCHAR(255),
                    warehouse VARCHAR(255),
                    schema_name VARCHAR(255),
                    created_at TIMESTAMPTZ NOT NULL,
                    last_synced_at TIMESTAMPTZ
                )",
                &[],
            )
            .await
            .map_err(storage_err)?;

        client
            .execute(
                "CREATE TABLE IF NOT EXISTS snapshots (
                    id UUID PRIMARY KEY,
                    connection_id UUID NOT NULL REFERENCES connections(id) ON DELETE CASCADE,
                    db_type VARCHAR(50) NOT NULL,
                    tables JSONB NOT NULL,
                    table_count INTEGER NOT NULL,
                    total_rows BIGINT NOT NULL,
                    extracted_at TIMESTAMPTZ NOT NULL,
                    previous_snapshot_id UUID,
                    changes JSONB NOT NULL
                )",
                &[],
            )
            .await
            .map_err(storage_err)?;

        let _ = client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_snapshots_connection_extracted
                 ON snapshots(connection_id, extracted_at DESC)",
                &[],
            )
            .await;

        info!("Store schema initialized");
        Ok(())
    }
}

fn storage_err(e: tokio_postgres::Error) -> AppError {
    AppError::Storage(format!("Database error: {}", e))
}

fn row_to_connection(row: &Row) -> Result<Connection, AppError> {
    let db_type: String = row.get("db_type");
    let db_kind: DbKind = db_type
        .parse()
        .map_err(|e: String| AppError::Storage(e))?;

    Ok(Connection {
        id: row.get("id"),
        name: row.get("name"),
        credentials: Credentials {
            db_type: db_kind,
            host: row.get("host"),
            port: row.get::<_, Option<i32>>("port").map(|p| p as u16),
            database: row.get("database"),
            username: row.get("username"),
            password: row.get("password"),
            account: row.get("account"),
            warehouse: row.get("warehouse"),
            schema_name: row.get("schema_name"),
        },
        created_at: row.get("created_at"),
        last_synced_at: row.get("last_synced_at"),
    })
}

fn row_to_snapshot(row: &Row) -> Result<Snapshot, AppError> {
    let db_type: String = row.get("db_type");
    let db_kind: DbKind = db_type
        .parse()
        .map_err(|e: String| AppError::Storage(e))?;

    let tables: serde_json::Value = row.get("tables");
    let changes: serde_json::Value = row.get("changes");

    Ok(Snapshot {
        id: row.get("id"),
        connection_id: row.get("connection_id"),
        db_kind,
        tables: serde_json::from_value(tables)
            .map_err(|e| AppError::Storage(format!("Corrupt table list: {}", e)))?,
        table_count: row.get::<_, i32>("table_count") as usize,
        total_rows: row.get("total_rows"),
        extracted_at: row.get("extracted_at"),
        previous_snapshot_id: row.get("previous_snapshot_id"),
        changes: serde_json::from_value(changes)
            .map_err(|e| AppError::Storage(format!("Corrupt change record: {}", e)))?,
    })
}

const SNAPSHOT_COLUMNS: &str = "id, connection_id, db_type, tables, table_count, total_rows, \
                                extracted_at, previous_snapshot_id, changes";

#[async_trait]
impl ConnectionStore for PgStore {
    async fn register(&self, connection: Connection) -> Result<Connection, AppError> {
        let client = self.client().await?;

        client
            .execute(
                "INSERT INTO connections
                 (id, name, db_type, host, port, database, username, password,
                  account, warehouse, schema_name, created_at, last_synced_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                &[
                    &connection.id,
                    &connection.name,
                    &connection.credentials.db_type.as_str(),
                    &connection.credentials.host,
                    &connection.credentials.port.map(|p| p as i32),
                    &connection.credentials.database,
                    &connection.credentials.username,
                    &connection.credentials.password,
                    &connection.credentials.account,
                    &connection.credentials.warehouse,
                    &connection.credentials.schema_name,
                    &connection.created_at,
                    &connection.last_synced_at,
                ],
            )
            .await
            .map_err(storage_err)?;

        Ok(connection)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Connection>, AppError> {
        let client = self.client().await?;
        let row = client
            .query_opt("SELECT * FROM connections WHERE id = $1", &[&id])
            .await
            .map_err(storage_err)?;

        row.as_ref().map(row_to_connection).transpose()
    }

    async fn list(&self) -> Result<Vec<Connection>, AppError> {
        let client = self.client().await?;
        let rows = client
            .query("SELECT * FROM connections ORDER BY created_at", &[])
            .await
            .map_err(storage_err)?;

        rows.iter().map(row_to_connection).collect()
    }

    async fn touch_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let client = self.client().await?;
        let updated = client
            .execute(
                "UPDATE connections SET last_synced_at = $2 WHERE id = $1",
                &[&id, &at],
            )
            .await
            .map_err(storage_err)?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("Connection {} not found", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let client = self.client().await?;
        let deleted = client
            .execute("DELETE FROM connections WHERE id = $1", &[&id])
            .await
            .map_err(storage_err)?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl SnapshotStore for PgStore {
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

        let tables_json = serde_json::to_value(&snapshot.tables)
            .map_err(|e| AppError::Storage(format!("Serialize tables: {}", e)))?;
        let changes_json = serde_json::to_value(&snapshot.changes)
            .map_err(|e| AppError::Storage(format!("Serialize changes: {}", e)))?;

        let client = self.client().await?;
        client
            .execute(
                "INSERT INTO snapshots
                 (id, connection_id, db_type, tables, table_count, total_rows,
                  extracted_at, previous_snapshot_id, changes)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &snapshot.id,
                    &snapshot.connection_id,
                    &snapshot.db_kind.as_str(),
                    &tables_json,
                    &(snapshot.table_count as i32),
                    &snapshot.total_rows,
                    &snapshot.extracted_at,
                    &snapshot.previous_snapshot_id,
                    &changes_json,
                ],
            )
            .await
            .map_err(storage_err)?;

        Ok(snapshot)
    }

    async fn update_tables(
        &self,
        snapshot_id: Uuid,
        tables: Vec<TableSummary>,
    ) -> Result<Snapshot, AppError> {
        let tables_json = serde_json::to_value(&tables)
            .map_err(|e| AppError::Storage(format!("Serialize tables: {}", e)))?;
        let table_count = tables.len() as i32;
        let total_rows = Snapshot::total_rows_of(&tables);

        // extractedAt is stamped at creation only; a refresh must not reorder
        // the snapshot chain.
        let client = self.client().await?;
        let row = client
            .query_opt(
                format!(
                    "UPDATE snapshots
                     SET tables = $2, table_count = $3, total_rows = $4
                     WHERE id = $1
                     RETURNING {}",
                    SNAPSHOT_COLUMNS
                )
                .as_str(),
                &[&snapshot_id, &tables_json, &table_count, &total_rows],
            )
            .await
            .map_err(storage_err)?;

        match row {
            Some(row) => row_to_snapshot(&row),
            None => Err(AppError::NotFound(format!(
                "Snapshot {} not found",
                snapshot_id
            ))),
        }
    }

    async fn most_recent(&self, connection_id: Uuid) -> Result<Option<Snapshot>, AppError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                format!(
                    "SELECT {} FROM snapshots
                     WHERE connection_id = $1
                     ORDER BY extracted_at DESC
                     LIMIT 1",
                    SNAPSHOT_COLUMNS
                )
                .as_str(),
                &[&connection_id],
            )
            .await
            .map_err(storage_err)?;

        row.as_ref().map(row_to_snapshot).transpose()
    }

    async fn find(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>, AppError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                format!("SELECT {} FROM snapshots WHERE id = $1", SNAPSHOT_COLUMNS).as_str(),
                &[&snapshot_id],
            )
            .await
            .map_err(storage_err)?;

        row.as_ref().map(row_to_snapshot).transpose()
    }

    async fn delete_for_connection(&self, connection_id: Uuid) -> Result<usize, AppError> {
        let client = self.client().await?;
        let deleted = client
            .execute(
                "DELETE FROM snapshots WHERE connection_id = $1",
                &[&connection_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(deleted as usize)
    }
}
