//! Book copies repository

use sqlx::{Pool, Postgres};

use super::conflict_on_unique;
use crate::{
    error::{AppError, AppResult},
    models::copy::{BookCopy, CopyStatus, CreateCopy, UpdateCopy},
};

const COPY_SELECT: &str = r#"
    SELECT bc.id, bc.book_id, bc.barcode, bc.call_number, bc.location, bc.borrowable, bc.status,
           bc.notes, bc.crea_date, bc.modif_date, l.id AS loan_id, l.due_date
    FROM book_copies bc
    LEFT JOIN loans l ON l.copy_id = bc.id AND l.returned_date IS NULL
"#;

#[derive(Clone)]
pub struct CopiesRepository {
    pool: Pool<Postgres>,
}

impl CopiesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Copies of a book with their open loan, if any
    pub async fn list_for_book(&self, book_id: i32) -> AppResult<Vec<BookCopy>> {
        let copies = sqlx::query_as::<_, BookCopy>(&format!(
            "{} WHERE bc.book_id = $1 ORDER BY bc.barcode",
            COPY_SELECT
        ))
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(copies)
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>(&format!("{} WHERE bc.id = $1", COPY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", id)))
    }

    /// Find by normalized barcode
    pub async fn get_by_barcode(&self, barcode: &str) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>(&format!("{} WHERE bc.barcode = $1", COPY_SELECT))
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Copy with barcode {} not found", barcode)))
    }

    /// Copies among `ids`, in no particular order; missing ids are simply absent
    pub async fn get_many(&self, ids: &[i32]) -> AppResult<Vec<BookCopy>> {
        let copies = sqlx::query_as::<_, BookCopy>(&format!("{} WHERE bc.id = ANY($1)", COPY_SELECT))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(copies)
    }

    pub async fn barcode_exists(&self, barcode: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM book_copies WHERE barcode = $1)")
                .bind(barcode)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn count_for_book(&self, book_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book_copies WHERE book_id = $1")
            .bind(book_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn create(&self, book_id: i32, data: &CreateCopy, barcode: &str) -> AppResult<BookCopy> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO book_copies (book_id, barcode, call_number, location, borrowable, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(book_id)
        .bind(barcode)
        .bind(&data.call_number)
        .bind(&data.location)
        .bind(data.borrowable.unwrap_or(true))
        .bind(CopyStatus::Active)
        .bind(&data.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Barcode already exists"))?;

        self.get_by_id(id).await
    }

    pub async fn update(&self, id: i32, data: &UpdateCopy, barcode: Option<String>) -> AppResult<BookCopy> {
        let result = sqlx::query(
            r#"
            UPDATE book_copies
            SET barcode = COALESCE($1, barcode),
                call_number = COALESCE($2, call_number),
                location = COALESCE($3, location),
                borrowable = COALESCE($4, borrowable),
                status = COALESCE($5, status),
                notes = COALESCE($6, notes),
                modif_date = NOW()
            WHERE id = $7
            "#,
        )
        .bind(barcode)
        .bind(&data.call_number)
        .bind(&data.location)
        .bind(data.borrowable)
        .bind(data.status)
        .bind(&data.notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Barcode already exists"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Copy with id {} not found", id)));
        }
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM book_copies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Copy with id {} not found", id)));
        }
        Ok(())
    }
}
