//! Attendance repository

use chrono::NaiveDate;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::attendance::{AttendanceQuery, AttendanceRecord, AttendanceSource, AttendanceSummary},
};

const RECORD_SELECT: &str = r#"
    SELECT a.id, a.user_id, u.login AS user_login, u.firstname AS user_firstname,
           u.lastname AS user_lastname, a.check_in, a.check_out, a.source, a.recorded_by, a.notes
    FROM attendance a
    JOIN users u ON u.id = a.user_id
"#;

#[derive(Clone)]
pub struct AttendanceRepository {
    pool: Pool<Postgres>,
}

impl AttendanceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<AttendanceRecord> {
        sqlx::query_as::<_, AttendanceRecord>(&format!("{} WHERE a.id = $1", RECORD_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attendance record {} not found", id)))
    }

    /// Open visit of a user
    pub async fn get_open(&self, user_id: i32) -> AppResult<Option<AttendanceRecord>> {
        let record = sqlx::query_as::<_, AttendanceRecord>(&format!(
            "{} WHERE a.user_id = $1 AND a.check_out IS NULL",
            RECORD_SELECT
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Open a visit; at most one open visit per user
    pub async fn check_in(
        &self,
        user_id: i32,
        source: AttendanceSource,
        recorded_by: Option<i32>,
        notes: Option<&str>,
    ) -> AppResult<AttendanceRecord> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO attendance (user_id, check_in, source, recorded_by, notes)
            VALUES ($1, NOW(), $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(source)
        .bind(recorded_by)
        .bind(notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::BusinessRule("User is already checked in".to_string())
            }
            _ => AppError::Database(e),
        })?;

        self.get_by_id(id).await
    }

    /// Close the open visit
    pub async fn check_out(&self, user_id: i32) -> AppResult<AttendanceRecord> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE attendance SET check_out = NOW()
            WHERE user_id = $1 AND check_out IS NULL
            RETURNING id
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::BusinessRule("User is not checked in".to_string()))?;

        self.get_by_id(id).await
    }

    pub async fn search(
        &self,
        query: &AttendanceQuery,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<AttendanceRecord>, i64)> {
        let mut conditions = Vec::new();
        let mut idx = 1;

        if query.user_id.is_some() {
            conditions.push(format!("a.user_id = ${}", idx));
            idx += 1;
        }
        if query.date_from.is_some() {
            conditions.push(format!("a.check_in >= ${}::date", idx));
            idx += 1;
        }
        if query.date_to.is_some() {
            conditions.push(format!("a.check_in < (${}::date + 1)", idx));
        }
        if query.open_only == Some(true) {
            conditions.push("a.check_out IS NULL".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM attendance a {}", where_clause);
        let select_query = format!(
            "{} {} ORDER BY a.check_in DESC LIMIT {} OFFSET {}",
            RECORD_SELECT, where_clause, limit, offset
        );

        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        let mut builder = sqlx::query_as::<_, AttendanceRecord>(&select_query);

        if let Some(user_id) = query.user_id {
            count_builder = count_builder.bind(user_id);
            builder = builder.bind(user_id);
        }
        if let Some(from) = query.date_from {
            count_builder = count_builder.bind(from);
            builder = builder.bind(from);
        }
        if let Some(to) = query.date_to {
            count_builder = count_builder.bind(to);
            builder = builder.bind(to);
        }

        let total = count_builder.fetch_one(&self.pool).await?;
        let records = builder.fetch_all(&self.pool).await?;

        Ok((records, total))
    }

    /// Visits on `date`, plus the number of visitors present right now
    pub async fn summary(&self, date: NaiveDate) -> AppResult<AttendanceSummary> {
        let summary = sqlx::query_as::<_, AttendanceSummary>(
            r#"
            SELECT $1::date AS date,
                   COUNT(*) FILTER (WHERE check_in::date = $1) AS visits,
                   COUNT(DISTINCT user_id) FILTER (WHERE check_in::date = $1) AS distinct_visitors,
                   COUNT(*) FILTER (WHERE check_out IS NULL) AS present_now,
                   (AVG(EXTRACT(EPOCH FROM (check_out - check_in)) / 60.0)
                       FILTER (WHERE check_in::date = $1 AND check_out IS NOT NULL))::float8 AS average_minutes
            FROM attendance
            WHERE check_in::date = $1 OR check_out IS NULL
            "#,
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(summary)
    }

    /// Visits started by a user since `since`
    pub async fn count_visits_since(&self, user_id: i32, since: NaiveDate) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance WHERE user_id = $1 AND check_in >= $2::date",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
