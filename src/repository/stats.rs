//! Aggregate counts for dashboards

use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        dashboard::{CatalogTotals, LoanTotals, TicketTotals},
        user::Role,
    },
};

#[derive(Clone)]
pub struct StatsRepository {
    pool: Pool<Postgres>,
}

impl StatsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Non-deleted accounts per role
    pub async fn users_by_role(&self) -> AppResult<Vec<(Role, i64)>> {
        let rows: Vec<(Role, i64)> = sqlx::query_as(
            "SELECT role, COUNT(*) FROM users WHERE status != 'deleted' GROUP BY role ORDER BY role",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn catalog_totals(&self) -> AppResult<CatalogTotals> {
        let totals = sqlx::query_as::<_, CatalogTotals>(
            r#"
            SELECT (SELECT COUNT(*) FROM books) AS books,
                   (SELECT COUNT(*) FROM book_copies) AS copies,
                   (SELECT COUNT(*) FROM authors) AS authors,
                   (SELECT COUNT(*) FROM categories) AS categories
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    pub async fn loan_totals(&self) -> AppResult<LoanTotals> {
        let totals = sqlx::query_as::<_, LoanTotals>(
            r#"
            SELECT COUNT(*) AS active,
                   COUNT(*) FILTER (WHERE due_date < NOW()) AS overdue,
                   COUNT(*) FILTER (WHERE due_date::date = CURRENT_DATE) AS due_today
            FROM loans
            WHERE returned_date IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    pub async fn ticket_totals_today(&self) -> AppResult<TicketTotals> {
        let totals = sqlx::query_as::<_, TicketTotals>(
            r#"
            SELECT COUNT(*) FILTER (WHERE issued_at::date = CURRENT_DATE) AS issued_today,
                   COUNT(*) FILTER (WHERE redeemed_at::date = CURRENT_DATE) AS redeemed_today
            FROM tickets
            WHERE issued_at::date = CURRENT_DATE OR redeemed_at::date = CURRENT_DATE
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    /// Issued, unexpired tickets of a user
    pub async fn active_tickets_for_user(&self, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tickets WHERE user_id = $1 AND status = 'issued' AND expires_at > NOW()",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn equipment_in_use(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM equipment WHERE status = 'in_use'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
