//! Backup export and restore

use crate::{
    error::AppResult,
    models::backup::{BackupSnapshot, RestoreReport},
    repository::Repository,
};

#[derive(Clone)]
pub struct BackupService {
    repository: Repository,
}

impl BackupService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn export(&self) -> AppResult<BackupSnapshot> {
        let tables = self.repository.backup.export_tables().await?;
        let snapshot = BackupSnapshot::new(tables)?;

        tracing::info!(
            checksum = %snapshot.checksum,
            users = snapshot.row_count("users"),
            books = snapshot.row_count("books"),
            loans = snapshot.row_count("loans"),
            "Backup exported"
        );
        Ok(snapshot)
    }

    /// Replace all data with the snapshot content
    pub async fn restore(&self, snapshot: BackupSnapshot, restored_by: i32) -> AppResult<RestoreReport> {
        snapshot.validate()?;

        let restored = self.repository.backup.restore_tables(&snapshot.tables).await?;

        tracing::warn!(
            restored_by,
            snapshot_created_at = %snapshot.created_at,
            checksum = %snapshot.checksum,
            rows = restored.values().sum::<usize>(),
            "Database restored from backup"
        );

        Ok(RestoreReport {
            restored,
            snapshot_created_at: snapshot.created_at,
        })
    }
}
