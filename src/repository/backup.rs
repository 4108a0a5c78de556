//! Whole-database export and restore

use indexmap::IndexMap;
use sqlx::{Pool, Postgres};

use crate::{error::AppResult, models::backup::BACKUP_TABLES};

/// Tables whose primary key is a serial `id`
const SERIAL_TABLES: [&str; 9] = [
    "users",
    "authors",
    "categories",
    "books",
    "book_copies",
    "loans",
    "equipment",
    "equipment_loans",
    "attendance",
];

fn row_order(table: &str) -> &'static str {
    match table {
        "book_authors" => "t.book_id, t.position, t.author_id",
        "tickets" => "t.issued_at, t.id",
        _ => "t.id",
    }
}

#[derive(Clone)]
pub struct BackupRepository {
    pool: Pool<Postgres>,
}

impl BackupRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Rows of every domain table, read from one consistent snapshot
    pub async fn export_tables(&self) -> AppResult<IndexMap<String, serde_json::Value>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let mut tables = IndexMap::new();
        for table in BACKUP_TABLES {
            let rows: serde_json::Value = sqlx::query_scalar(&format!(
                "SELECT COALESCE(json_agg(t ORDER BY {}), '[]'::json) FROM {} t",
                row_order(table),
                table
            ))
            .fetch_one(&mut *tx)
            .await?;
            tables.insert(table.to_string(), rows);
        }

        tx.commit().await?;
        Ok(tables)
    }

    /// Replace all domain data with `tables` in a single transaction.
    /// Table names must already be checked against `BACKUP_TABLES`.
    pub async fn restore_tables(
        &self,
        tables: &IndexMap<String, serde_json::Value>,
    ) -> AppResult<IndexMap<String, usize>> {
        let mut tx = self.pool.begin().await?;

        let all: Vec<&str> = BACKUP_TABLES.iter().rev().copied().collect();
        sqlx::query(&format!("TRUNCATE {} RESTART IDENTITY CASCADE", all.join(", ")))
            .execute(&mut *tx)
            .await?;

        let mut restored = IndexMap::new();
        for table in BACKUP_TABLES {
            let rows = match tables.get(table) {
                Some(rows) => rows,
                None => {
                    restored.insert(table.to_string(), 0);
                    continue;
                }
            };
            let count = rows.as_array().map(|r| r.len()).unwrap_or(0);

            if count > 0 {
                sqlx::query(&format!(
                    "INSERT INTO {0} SELECT * FROM json_populate_recordset(NULL::{0}, $1::json)",
                    table
                ))
                .bind(rows)
                .execute(&mut *tx)
                .await?;
            }
            restored.insert(table.to_string(), count);
        }

        for table in SERIAL_TABLES {
            sqlx::query(&format!(
                "SELECT setval(pg_get_serial_sequence('{0}', 'id'), COALESCE((SELECT MAX(id) FROM {0}), 0) + 1, false)",
                table
            ))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(restored)
    }
}
