//! Loans repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanDetails, LoanQuery, OverdueLoan},
};

const LOAN_DETAILS_SELECT: &str = r#"
    SELECT l.id, l.date, l.due_date, l.renew_date, l.nb_renews, l.returned_date,
           l.book_id, b.title AS book_title, l.copy_id, bc.barcode,
           l.user_id, u.login AS user_login, u.firstname AS user_firstname, u.lastname AS user_lastname,
           (l.returned_date IS NULL AND l.due_date < NOW()) AS is_overdue
    FROM loans l
    JOIN books b ON b.id = l.book_id
    JOIN book_copies bc ON bc.id = l.copy_id
    JOIN users u ON u.id = l.user_id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    pub async fn get_details(&self, id: i32) -> AppResult<LoanDetails> {
        sqlx::query_as::<_, LoanDetails>(&format!("{} WHERE l.id = $1", LOAN_DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Open loan on a copy
    pub async fn get_open_for_copy(&self, copy_id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE copy_id = $1 AND returned_date IS NULL",
        )
        .bind(copy_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    /// (open loans, overdue loans) held by a user
    pub async fn count_for_user(&self, user_id: i32) -> AppResult<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE due_date < NOW())
            FROM loans
            WHERE user_id = $1 AND returned_date IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    /// Insert a loan; a concurrent loan on the same copy is refused by the open-loan index
    pub async fn create(
        &self,
        user_id: i32,
        copy_id: i32,
        book_id: i32,
        due_date: DateTime<Utc>,
        ticket_id: Option<Uuid>,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, copy_id, book_id, ticket_id, date, due_date)
            VALUES ($1, $2, $3, $4, NOW(), $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(copy_id)
        .bind(book_id)
        .bind(ticket_id)
        .bind(due_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::BusinessRule("Copy is already on loan".to_string())
            }
            _ => AppError::Database(e),
        })
    }

    /// Close an open loan
    pub async fn mark_returned(&self, id: i32) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET returned_date = NOW()
            WHERE id = $1 AND returned_date IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match loan {
            Some(loan) => Ok(loan),
            None => {
                // Distinguish unknown loan from double return
                self.get_by_id(id).await?;
                Err(AppError::BusinessRule("Loan has already been returned".to_string()))
            }
        }
    }

    pub async fn renew(&self, id: i32, due_date: DateTime<Utc>) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET due_date = $1, renew_date = NOW(), nb_renews = nb_renews + 1
            WHERE id = $2 AND returned_date IS NULL
            RETURNING *
            "#,
        )
        .bind(due_date)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::BusinessRule("Cannot renew a returned loan".to_string()))
    }

    /// Search loans with pagination
    pub async fn search(&self, query: &LoanQuery, limit: i64, offset: i64) -> AppResult<(Vec<LoanDetails>, i64)> {
        let mut conditions = Vec::new();

        if query.user_id.is_some() {
            conditions.push("l.user_id = $1".to_string());
        }
        if query.active.unwrap_or(true) || query.overdue == Some(true) {
            conditions.push("l.returned_date IS NULL".to_string());
        }
        if query.overdue == Some(true) {
            conditions.push("l.due_date < NOW()".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM loans l {}", where_clause);
        let select_query = format!(
            "{} {} ORDER BY l.returned_date IS NOT NULL, l.due_date, l.id LIMIT {} OFFSET {}",
            LOAN_DETAILS_SELECT, where_clause, limit, offset
        );

        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        let mut builder = sqlx::query_as::<_, LoanDetails>(&select_query);

        if let Some(user_id) = query.user_id {
            count_builder = count_builder.bind(user_id);
            builder = builder.bind(user_id);
        }

        let total = count_builder.fetch_one(&self.pool).await?;
        let loans = builder.fetch_all(&self.pool).await?;

        Ok((loans, total))
    }

    /// Open loans of a user, soonest due first
    pub async fn open_for_user(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        let loans = sqlx::query_as::<_, LoanDetails>(&format!(
            "{} WHERE l.user_id = $1 AND l.returned_date IS NULL ORDER BY l.due_date",
            LOAN_DETAILS_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    /// Every open loan past its due date, grouped by borrower
    pub async fn overdue(&self) -> AppResult<Vec<OverdueLoan>> {
        let loans = sqlx::query_as::<_, OverdueLoan>(
            r#"
            SELECT l.id AS loan_id, l.user_id, u.email, u.firstname, u.lastname, u.login,
                   b.title AS book_title, bc.barcode, l.due_date
            FROM loans l
            JOIN users u ON u.id = l.user_id
            JOIN books b ON b.id = l.book_id
            JOIN book_copies bc ON bc.id = l.copy_id
            WHERE l.returned_date IS NULL AND l.due_date < NOW()
            ORDER BY l.user_id, l.due_date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }
}
