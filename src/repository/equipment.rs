//! Equipment repository

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::conflict_on_unique;
use crate::{
    error::{AppError, AppResult},
    models::equipment::{
        CreateEquipment, Equipment, EquipmentKind, EquipmentLoan, EquipmentQuery, EquipmentStatus,
        UpdateEquipment,
    },
    search,
};

const EQUIPMENT_LOAN_SELECT: &str = r#"
    SELECT el.id, el.equipment_id, el.user_id, u.login AS user_login, el.date, el.due_date,
           el.returned_date
    FROM equipment_loans el
    JOIN users u ON u.id = el.user_id
"#;

#[derive(Clone)]
pub struct EquipmentRepository {
    pool: Pool<Postgres>,
}

impl EquipmentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self, query: &EquipmentQuery) -> AppResult<Vec<Equipment>> {
        let pattern = query.q.as_deref().and_then(search::like_pattern);

        let mut conditions = Vec::new();
        let mut idx = 1;

        if pattern.is_some() {
            conditions.push(format!("search_key LIKE ${}", idx));
            idx += 1;
        }
        if query.kind.is_some() {
            conditions.push(format!("kind = ${}", idx));
            idx += 1;
        }
        if query.status.is_some() {
            conditions.push(format!("status = ${}", idx));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let select_query = format!("SELECT * FROM equipment {} ORDER BY name, id", where_clause);
        let mut builder = sqlx::query_as::<_, Equipment>(&select_query);

        if let Some(ref p) = pattern {
            builder = builder.bind(p);
        }
        if let Some(kind) = query.kind {
            builder = builder.bind(kind);
        }
        if let Some(status) = query.status {
            builder = builder.bind(status);
        }

        Ok(builder.fetch_all(&self.pool).await?)
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Equipment> {
        sqlx::query_as::<_, Equipment>("SELECT * FROM equipment WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Equipment with id {} not found", id)))
    }

    pub async fn create(&self, data: &CreateEquipment) -> AppResult<Equipment> {
        let key = search::search_key([Some(data.name.as_str()), data.serial_number.as_deref()]);

        sqlx::query_as::<_, Equipment>(
            r#"
            INSERT INTO equipment (name, kind, serial_number, location, status, notes, search_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.name.trim())
        .bind(data.kind.unwrap_or(EquipmentKind::Other))
        .bind(&data.serial_number)
        .bind(&data.location)
        .bind(EquipmentStatus::Available)
        .bind(&data.notes)
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Serial number already exists"))
    }

    /// Apply an update under a row lock so a concurrent checkout cannot slip
    /// between the status check and the write
    pub async fn update(&self, id: i32, data: &UpdateEquipment) -> AppResult<Equipment> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Equipment>("SELECT * FROM equipment WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Equipment with id {} not found", id)))?;

        if let Some(to) = data.status {
            current.status.check_manual_transition(to)?;

            if current.status == EquipmentStatus::InUse && to == EquipmentStatus::Retired {
                let closed = sqlx::query(
                    "UPDATE equipment_loans SET returned_date = NOW() WHERE equipment_id = $1 AND returned_date IS NULL",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;
                tracing::info!(equipment_id = id, closed = closed.rows_affected(), "Open checkout closed on retirement");
            }
        }

        let name = data.name.clone().unwrap_or(current.name);
        let serial_number = data.serial_number.clone().or(current.serial_number);
        let key = search::search_key([Some(name.as_str()), serial_number.as_deref()]);

        let updated = sqlx::query_as::<_, Equipment>(
            r#"
            UPDATE equipment
            SET name = $1, kind = COALESCE($2, kind), serial_number = $3,
                location = COALESCE($4, location), status = COALESCE($5, status),
                notes = COALESCE($6, notes), search_key = $7, modif_date = NOW()
            WHERE id = $8 AND status = $9
            RETURNING *
            "#,
        )
        .bind(name.trim())
        .bind(data.kind)
        .bind(serial_number)
        .bind(&data.location)
        .bind(data.status)
        .bind(&data.notes)
        .bind(key)
        .bind(id)
        .bind(current.status)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Serial number already exists"))?
        .ok_or_else(|| AppError::Conflict("Equipment status changed concurrently".to_string()))?;

        tx.commit().await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM equipment WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Equipment with id {} not found", id)));
        }
        Ok(())
    }

    /// Move available equipment to in_use and open a checkout record
    pub async fn checkout(
        &self,
        id: i32,
        user_id: i32,
        due_date: DateTime<Utc>,
        ticket_id: Option<Uuid>,
    ) -> AppResult<EquipmentLoan> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE equipment SET status = 'in_use', modif_date = NOW()
            WHERE id = $1 AND status = 'available'
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            let equipment = self.get_by_id(id).await?;
            equipment.status.check_checkout()?;
            return Err(AppError::BusinessRule("Equipment is not available".to_string()));
        }

        let loan_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO equipment_loans (equipment_id, user_id, ticket_id, date, due_date)
            VALUES ($1, $2, $3, NOW(), $4)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(ticket_id)
        .bind(due_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_loan(loan_id).await
    }

    /// Close the open checkout and make the equipment available again
    pub async fn return_equipment(&self, id: i32) -> AppResult<EquipmentLoan> {
        let mut tx = self.pool.begin().await?;

        let loan_id = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE equipment_loans SET returned_date = NOW()
            WHERE equipment_id = $1 AND returned_date IS NULL
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(loan_id) = loan_id else {
            tx.rollback().await?;
            self.get_by_id(id).await?;
            return Err(AppError::BusinessRule("Equipment is not checked out".to_string()));
        };

        sqlx::query(
            "UPDATE equipment SET status = 'available', modif_date = NOW() WHERE id = $1 AND status = 'in_use'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_loan(loan_id).await
    }

    pub async fn get_loan(&self, loan_id: i32) -> AppResult<EquipmentLoan> {
        sqlx::query_as::<_, EquipmentLoan>(&format!("{} WHERE el.id = $1", EQUIPMENT_LOAN_SELECT))
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Equipment loan with id {} not found", loan_id)))
    }

    /// Checkout history, most recent first
    pub async fn loans_history(&self, id: i32) -> AppResult<Vec<EquipmentLoan>> {
        let loans = sqlx::query_as::<_, EquipmentLoan>(&format!(
            "{} WHERE el.equipment_id = $1 ORDER BY el.date DESC",
            EQUIPMENT_LOAN_SELECT
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    pub async fn count_by_status(&self) -> AppResult<Vec<(EquipmentStatus, i64)>> {
        let rows: Vec<(EquipmentStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM equipment GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}
