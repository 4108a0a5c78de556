//! Books repository for catalog titles

use chrono::Utc;
use sqlx::{Pool, Postgres};

use super::conflict_on_unique;
use crate::{
    error::{AppError, AppResult},
    models::{
        author::BookAuthor,
        book::{Book, BookQuery, BookShort, CreateBook, UpdateBook},
    },
    search,
};

/// Copy is borrowable, active and not on loan
pub(crate) const COPY_AVAILABLE: &str = r#"
    bc.borrowable AND bc.status = 'active'
    AND NOT EXISTS (SELECT 1 FROM loans l WHERE l.copy_id = bc.id AND l.returned_date IS NULL)
"#;

fn book_short_select() -> String {
    format!(
        r#"
        SELECT b.id, b.isbn, b.title, b.publication_year, b.category_id, c.name AS category_name,
               (SELECT string_agg(COALESCE(a.firstname || ' ', '') || a.lastname, ', ' ORDER BY ba.position)
                  FROM book_authors ba JOIN authors a ON a.id = ba.author_id
                 WHERE ba.book_id = b.id) AS authors,
               (SELECT COUNT(*) FROM book_copies bc WHERE bc.book_id = b.id) AS nb_copies,
               (SELECT COUNT(*) FROM book_copies bc WHERE bc.book_id = b.id AND {}) AS nb_available
        FROM books b
        LEFT JOIN categories c ON c.id = b.category_id
        "#,
        COPY_AVAILABLE
    )
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Search books with pagination
    pub async fn search(&self, query: &BookQuery, limit: i64, offset: i64) -> AppResult<(Vec<BookShort>, i64)> {
        let pattern = query.search_pattern();

        let mut conditions = Vec::new();
        let mut idx = 1;

        if pattern.is_some() {
            conditions.push(format!("b.search_key LIKE ${}", idx));
            idx += 1;
        }
        if query.category_id.is_some() {
            conditions.push(format!("b.category_id = ${}", idx));
            idx += 1;
        }
        if query.author_id.is_some() {
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM book_authors ba WHERE ba.book_id = b.id AND ba.author_id = ${})",
                idx
            ));
        }
        if query.available == Some(true) {
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM book_copies bc WHERE bc.book_id = b.id AND {})",
                COPY_AVAILABLE
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM books b {}", where_clause);
        let select_query = format!(
            "{} {} ORDER BY b.title, b.id LIMIT {} OFFSET {}",
            book_short_select(),
            where_clause,
            limit,
            offset
        );

        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        let mut builder = sqlx::query_as::<_, BookShort>(&select_query);

        if let Some(ref p) = pattern {
            count_builder = count_builder.bind(p);
            builder = builder.bind(p);
        }
        if let Some(category_id) = query.category_id {
            count_builder = count_builder.bind(category_id);
            builder = builder.bind(category_id);
        }
        if let Some(author_id) = query.author_id {
            count_builder = count_builder.bind(author_id);
            builder = builder.bind(author_id);
        }

        let total = count_builder.fetch_one(&self.pool).await?;
        let books = builder.fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            SELECT id, isbn, title, subtitle, publisher, publication_year, language, description,
                   category_id, crea_date, modif_date
            FROM books WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Authors of a book in credit order
    pub async fn get_authors(&self, book_id: i32) -> AppResult<Vec<BookAuthor>> {
        let authors = sqlx::query_as::<_, BookAuthor>(
            r#"
            SELECT a.id, a.lastname, a.firstname, ba.position
            FROM book_authors ba
            JOIN authors a ON a.id = ba.author_id
            WHERE ba.book_id = $1
            ORDER BY ba.position
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(authors)
    }

    /// (total copies, available copies)
    pub async fn copy_counts(&self, book_id: i32) -> AppResult<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(&format!(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE {})
            FROM book_copies bc WHERE bc.book_id = $1
            "#,
            COPY_AVAILABLE
        ))
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    /// Create a book and its author links
    pub async fn create(&self, data: &CreateBook, isbn: Option<String>) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO books (isbn, title, subtitle, publisher, publication_year, language,
                               description, category_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(isbn)
        .bind(data.title.trim())
        .bind(&data.subtitle)
        .bind(&data.publisher)
        .bind(data.publication_year)
        .bind(&data.language)
        .bind(&data.description)
        .bind(data.category_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "A book with this ISBN already exists"))?;

        sqlx::query(
            r#"
            INSERT INTO book_authors (book_id, author_id, position)
            SELECT $1, wanted.id, (wanted.ord - 1)::smallint
            FROM UNNEST($2::int[]) WITH ORDINALITY AS wanted(id, ord)
            "#,
        )
        .bind(id)
        .bind(&data.author_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.refresh_search_key(id).await?;
        self.get_by_id(id).await
    }

    /// Update book fields; `author_ids` replaces the author list when present
    pub async fn update(&self, id: i32, data: &UpdateBook, isbn: Option<String>) -> AppResult<Book> {
        let mut sets = vec!["modif_date = $1".to_string()];
        let mut idx = 2;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, idx));
                    idx += 1;
                }
            };
        }

        add_field!(isbn, "isbn");
        add_field!(data.title, "title");
        add_field!(data.subtitle, "subtitle");
        add_field!(data.publisher, "publisher");
        add_field!(data.publication_year, "publication_year");
        add_field!(data.language, "language");
        add_field!(data.description, "description");
        add_field!(data.category_id, "category_id");

        let query = format!("UPDATE books SET {} WHERE id = ${}", sets.join(", "), idx);

        let mut tx = self.pool.begin().await?;

        let mut builder = sqlx::query(&query).bind(Utc::now());

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(isbn);
        bind_field!(data.title);
        bind_field!(data.subtitle);
        bind_field!(data.publisher);
        bind_field!(data.publication_year);
        bind_field!(data.language);
        bind_field!(data.description);
        bind_field!(data.category_id);

        let result = builder
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "A book with this ISBN already exists"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        if let Some(ref author_ids) = data.author_ids {
            sqlx::query("DELETE FROM book_authors WHERE book_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO book_authors (book_id, author_id, position)
                SELECT $1, wanted.id, (wanted.ord - 1)::smallint
                FROM UNNEST($2::int[]) WITH ORDINALITY AS wanted(id, ord)
                "#,
            )
            .bind(id)
            .bind(author_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.refresh_search_key(id).await?;
        self.get_by_id(id).await
    }

    /// Delete a book with its copies and closed loan history
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }

    /// Open loans on any copy of the book
    pub async fn count_open_loans(&self, id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE book_id = $1 AND returned_date IS NULL",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Recompute the folded search text from title, ISBN and author names
    pub async fn refresh_search_key(&self, id: i32) -> AppResult<()> {
        let book = self.get_by_id(id).await?;
        let authors = self.get_authors(id).await?;

        let author_names: Vec<String> = authors
            .iter()
            .map(|a| match &a.firstname {
                Some(first) => format!("{} {}", first, a.lastname),
                None => a.lastname.clone(),
            })
            .collect();

        let key = search::search_key(
            [
                Some(book.title.as_str()),
                book.subtitle.as_deref(),
                book.isbn.as_deref(),
                book.publisher.as_deref(),
            ]
            .into_iter()
            .chain(author_names.iter().map(|n| Some(n.as_str()))),
        );

        sqlx::query("UPDATE books SET search_key = $1 WHERE id = $2")
            .bind(key)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
