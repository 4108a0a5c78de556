//! Backup snapshot format

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// Domain tables in dependency order: restore inserts in this order
/// and truncates in reverse.
pub const BACKUP_TABLES: [&str; 11] = [
    "users",
    "authors",
    "categories",
    "books",
    "book_authors",
    "book_copies",
    "tickets",
    "loans",
    "equipment",
    "equipment_loans",
    "attendance",
];

/// Full data export
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackupSnapshot {
    pub format_version: u32,
    pub app_version: String,
    pub created_at: DateTime<Utc>,
    /// SHA-256 (hex) of the serialized `tables`
    pub checksum: String,
    /// Table name to array of rows
    #[schema(value_type = Object)]
    pub tables: IndexMap<String, serde_json::Value>,
}

impl BackupSnapshot {
    pub fn new(tables: IndexMap<String, serde_json::Value>) -> AppResult<Self> {
        let checksum = checksum(&tables)?;
        Ok(Self {
            format_version: BACKUP_FORMAT_VERSION,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            checksum,
            tables,
        })
    }

    /// Check version, checksum and table names before a restore
    pub fn validate(&self) -> AppResult<()> {
        if self.format_version != BACKUP_FORMAT_VERSION {
            return Err(AppError::Validation(format!(
                "Unsupported backup format version {}",
                self.format_version
            )));
        }

        if let Some(unknown) = self
            .tables
            .keys()
            .find(|name| !BACKUP_TABLES.contains(&name.as_str()))
        {
            return Err(AppError::Validation(format!("Unknown table in backup: {}", unknown)));
        }

        if let Some((name, _)) = self.tables.iter().find(|(_, rows)| !rows.is_array()) {
            return Err(AppError::Validation(format!("Table {} is not an array of rows", name)));
        }

        if checksum(&self.tables)? != self.checksum.to_lowercase() {
            return Err(AppError::Validation("Backup checksum mismatch".to_string()));
        }
        Ok(())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .get(table)
            .and_then(|rows| rows.as_array())
            .map(|rows| rows.len())
            .unwrap_or(0)
    }
}

fn checksum(tables: &IndexMap<String, serde_json::Value>) -> AppResult<String> {
    let bytes = serde_json::to_vec(tables)
        .map_err(|e| AppError::Internal(format!("Failed to serialize backup: {}", e)))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Rows restored per table
#[derive(Debug, Serialize, ToSchema)]
pub struct RestoreReport {
    #[schema(value_type = Object)]
    pub restored: IndexMap<String, usize>,
    pub snapshot_created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tables() -> IndexMap<String, serde_json::Value> {
        let mut tables = IndexMap::new();
        tables.insert("users".to_string(), json!([{"id": 1, "login": "admin"}]));
        tables.insert("authors".to_string(), json!([]));
        tables
    }

    #[test]
    fn test_snapshot_survives_json_round_trip() {
        let snapshot = BackupSnapshot::new(tables()).unwrap();
        let text = serde_json::to_string(&snapshot).unwrap();
        let parsed: BackupSnapshot = serde_json::from_str(&text).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.row_count("users"), 1);
        assert_eq!(parsed.row_count("loans"), 0);
    }

    #[test]
    fn test_tampered_snapshot_fails_checksum() {
        let mut snapshot = BackupSnapshot::new(tables()).unwrap();
        snapshot
            .tables
            .insert("users".to_string(), json!([{"id": 1, "login": "mallory"}]));
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_unknown_table_rejected() {
        let mut t = tables();
        t.insert("pg_authid".to_string(), json!([]));
        let snapshot = BackupSnapshot::new(t).unwrap();
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut snapshot = BackupSnapshot::new(tables()).unwrap();
        snapshot.format_version = 99;
        assert!(snapshot.validate().is_err());
    }
}
