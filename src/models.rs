//! Core domain types
//!
//! Connections, schema snapshots and the table/column summaries they carry.
//! Wire names are camelCase to match the analysis service and the frontend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported source database kinds (closed set, mirrors the connector factory
/// of the analysis service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    Postgres,
    Mysql,
    Mssql,
    Snowflake,
}

impl DbKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbKind::Postgres => "postgres",
            DbKind::Mysql => "mysql",
            DbKind::Mssql => "mssql",
            DbKind::Snowflake => "snowflake",
        }
    }
}

impl std::str::FromStr for DbKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(DbKind::Postgres),
            "mysql" => Ok(DbKind::Mysql),
            "mssql" => Ok(DbKind::Mssql),
            "snowflake" => Ok(DbKind::Snowflake),
            other => Err(format!("Unsupported database type: {}", other)),
        }
    }
}

/// Normalized credential bundle sent to the analysis service.
///
/// Field names follow the analysis service's request model (`db_type`,
/// `username`, Snowflake extras), not our internal naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub db_type: DbKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    // Snowflake-specific
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(rename = "schema", skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
}

/// A registered, credentialed reference to a source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Column summary inside a table summary. Only the column count participates
/// in change detection; the rest is documentation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSummary {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub is_nullable: bool,
}

/// Per-table summary as returned by the extraction endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub name: String,
    /// Missing row counts are treated as zero when aggregating.
    #[serde(default)]
    pub row_count: Option<i64>,
    #[serde(default)]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub columns: Vec<ColumnSummary>,
}

impl TableSummary {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// The new/dropped/modified table-name lists produced by comparing a snapshot
/// against its predecessor. All three are empty for a first snapshot created
/// on the scheduled path; a first manual snapshot lists every table as new.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaChanges {
    pub new_tables: Vec<String>,
    pub dropped_tables: Vec<String>,
    pub modified_tables: Vec<String>,
}

/// Versioned point-in-time capture of a connection's schema.
///
/// The table list and `changes` are fixed at creation; quality scores and AI
/// narrative are written into the record out-of-band by the analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub db_kind: DbKind,
    pub tables: Vec<TableSummary>,
    pub table_count: usize,
    pub total_rows: i64,
    pub extracted_at: DateTime<Utc>,
    /// Back-link to the snapshot this one was diffed against. Must reference
    /// a snapshot of the same connection with an earlier `extractedAt`.
    pub previous_snapshot_id: Option<Uuid>,
    pub changes: SchemaChanges,
}

impl Snapshot {
    /// Sum of per-table row counts, missing counts as zero.
    pub fn total_rows_of(tables: &[TableSummary]) -> i64 {
        tables.iter().map(|t| t.row_count.unwrap_or(0)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_rows_treats_missing_counts_as_zero() {
        let tables = vec![
            TableSummary {
                name: "orders".to_string(),
                row_count: Some(120),
                size_bytes: None,
                columns: vec![],
            },
            TableSummary {
                name: "customers".to_string(),
                row_count: None,
                size_bytes: None,
                columns: vec![],
            },
        ];

        assert_eq!(Snapshot::total_rows_of(&tables), 120);
    }

    #[test]
    fn credentials_serialize_with_service_field_names() {
        let creds = Credentials {
            db_type: DbKind::Snowflake,
            host: None,
            port: None,
            database: Some("analytics".to_string()),
            username: Some("reporter".to_string()),
            password: Some("secret".to_string()),
            account: Some("xy12345".to_string()),
            warehouse: Some("COMPUTE_WH".to_string()),
            schema_name: Some("PUBLIC".to_string()),
        };

        let value = serde_json::to_value(&creds).unwrap();
        assert_eq!(value["db_type"], "snowflake");
        assert_eq!(value["schema"], "PUBLIC");
        assert!(value.get("host").is_none());
    }
}
