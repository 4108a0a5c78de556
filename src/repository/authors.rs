//! Authors repository

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::author::{Author, CreateAuthor, UpdateAuthor},
    search,
};

const AUTHOR_SELECT: &str = r#"
    SELECT a.id, a.lastname, a.firstname, a.bio, a.nationality, a.crea_date, a.modif_date,
           (SELECT COUNT(*) FROM book_authors ba WHERE ba.author_id = a.id) AS nb_books
    FROM authors a
"#;

#[derive(Clone)]
pub struct AuthorsRepository {
    pool: Pool<Postgres>,
}

impl AuthorsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// List authors, optionally filtered by folded name
    pub async fn list(&self, q: Option<&str>) -> AppResult<Vec<Author>> {
        let authors = match q.and_then(search::like_pattern) {
            Some(pattern) => {
                sqlx::query_as::<_, Author>(&format!(
                    "{} WHERE a.search_key LIKE $1 ORDER BY a.lastname, a.firstname",
                    AUTHOR_SELECT
                ))
                .bind(pattern)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Author>(&format!(
                    "{} ORDER BY a.lastname, a.firstname",
                    AUTHOR_SELECT
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(authors)
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Author> {
        sqlx::query_as::<_, Author>(&format!("{} WHERE a.id = $1", AUTHOR_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    /// Ids from `ids` that do not exist
    pub async fn missing_ids(&self, ids: &[i32]) -> AppResult<Vec<i32>> {
        let missing: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT wanted.id FROM UNNEST($1::int[]) AS wanted(id)
            WHERE NOT EXISTS (SELECT 1 FROM authors a WHERE a.id = wanted.id)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(missing)
    }

    pub async fn create(&self, data: &CreateAuthor) -> AppResult<Author> {
        let key = search::search_key([data.firstname.as_deref(), Some(data.lastname.as_str())]);

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO authors (lastname, firstname, bio, nationality, search_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(data.lastname.trim())
        .bind(&data.firstname)
        .bind(&data.bio)
        .bind(&data.nationality)
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    pub async fn update(&self, id: i32, data: &UpdateAuthor) -> AppResult<Author> {
        let current = self.get_by_id(id).await?;

        let lastname = data.lastname.clone().unwrap_or(current.lastname);
        let firstname = data.firstname.clone().or(current.firstname);
        let key = search::search_key([firstname.as_deref(), Some(lastname.as_str())]);

        sqlx::query(
            r#"
            UPDATE authors
            SET lastname = $1, firstname = $2, bio = COALESCE($3, bio),
                nationality = COALESCE($4, nationality), search_key = $5, modif_date = NOW()
            WHERE id = $6
            "#,
        )
        .bind(lastname.trim())
        .bind(firstname)
        .bind(&data.bio)
        .bind(&data.nationality)
        .bind(key)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Author with id {} not found", id)));
        }
        Ok(())
    }

    /// Books crediting this author
    pub async fn book_ids(&self, id: i32) -> AppResult<Vec<i32>> {
        let ids: Vec<i32> = sqlx::query_scalar("SELECT book_id FROM book_authors WHERE author_id = $1")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
