//! Categories repository

use sqlx::{Pool, Postgres};

use super::conflict_on_unique;
use crate::{
    error::{AppError, AppResult},
    models::category::{Category, CreateCategory, UpdateCategory},
};

const CATEGORY_SELECT: &str = r#"
    SELECT c.id, c.name, c.description, c.crea_date, c.modif_date,
           (SELECT COUNT(*) FROM books b WHERE b.category_id = c.id) AS nb_books
    FROM categories c
"#;

#[derive(Clone)]
pub struct CategoriesRepository {
    pool: Pool<Postgres>,
}

impl CategoriesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(&format!("{} ORDER BY LOWER(c.name)", CATEGORY_SELECT))
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(&format!("{} WHERE c.id = $1", CATEGORY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category with id {} not found", id)))
    }

    pub async fn create(&self, data: &CreateCategory) -> AppResult<Category> {
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO categories (name, description) VALUES ($1, $2) RETURNING id",
        )
        .bind(data.name.trim())
        .bind(&data.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Category name already exists"))?;

        self.get_by_id(id).await
    }

    pub async fn update(&self, id: i32, data: &UpdateCategory) -> AppResult<Category> {
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET name = COALESCE($1, name), description = COALESCE($2, description), modif_date = NOW()
            WHERE id = $3
            "#,
        )
        .bind(data.name.as_deref().map(str::trim))
        .bind(&data.description)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Category name already exists"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Category with id {} not found", id)));
        }
        self.get_by_id(id).await
    }

    /// Books keep existing with no category (ON DELETE SET NULL)
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Category with id {} not found", id)));
        }
        Ok(())
    }
}
