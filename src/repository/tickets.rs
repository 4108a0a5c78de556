//! Tickets repository
//!
//! State changes are single conditional UPDATEs, so two scanners racing on
//! the same ticket cannot both win.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::ticket::{Ticket, TicketPurpose, TicketState, TicketStatus},
};

/// Listing cap; tickets are short-lived and users hold few
const LIST_LIMIT: i64 = 200;

/// Fields of a ticket about to be stored
pub struct NewTicket<'a> {
    pub user_id: i32,
    pub purpose: TicketPurpose,
    pub copy_ids: &'a [i32],
    pub equipment_id: Option<i32>,
    pub issued_by: i32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TicketsRepository {
    pool: Pool<Postgres>,
}

impl TicketsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn create(&self, ticket: NewTicket<'_>) -> AppResult<Ticket> {
        let created = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets (id, user_id, purpose, copy_ids, equipment_id, status, issued_by,
                                 issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ticket.user_id)
        .bind(ticket.purpose)
        .bind(ticket.copy_ids)
        .bind(ticket.equipment_id)
        .bind(TicketStatus::Issued)
        .bind(ticket.issued_by)
        .bind(ticket.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Ticket> {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", id)))
    }

    /// Mark an issued, unexpired ticket as redeemed. `None` when another
    /// request got there first or the ticket is no longer usable.
    pub async fn claim(&self, id: Uuid, redeemed_by: i32) -> AppResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET status = 'redeemed', redeemed_at = NOW(), redeemed_by = $2
            WHERE id = $1 AND status = 'issued' AND expires_at > NOW()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(redeemed_by)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    /// Revoke an issued ticket. `None` when it is no longer issued.
    pub async fn revoke(&self, id: Uuid) -> AppResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets SET status = 'revoked', revoked_at = NOW()
            WHERE id = $1 AND status = 'issued'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    /// Most recent tickets first
    /// Newest first; `state` filters on the status clients see
    pub async fn list(&self, user_id: Option<i32>, state: Option<TicketState>) -> AppResult<Vec<Ticket>> {
        let (status, expired) = match state.map(TicketState::storage_filter) {
            Some((status, expired)) => (Some(status), expired),
            None => (None, None),
        };

        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE ($1::int IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::bool IS NULL OR (expires_at <= NOW()) = $3)
            ORDER BY issued_at DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(expired)
        .bind(LIST_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }
}
