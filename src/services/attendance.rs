//! Attendance service

use chrono::{NaiveDate, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{
        attendance::{
            AttendanceAction, AttendanceEvent, AttendanceQuery, AttendanceRecord, AttendanceSource,
            AttendanceSummary,
        },
        Paginated, Pagination,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct AttendanceService {
    repository: Repository,
}

impl AttendanceService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    async fn check_visitor(&self, user_id: i32) -> AppResult<()> {
        let user = self.repository.users.get_by_id(user_id).await?;
        if !user.is_active() {
            return Err(AppError::BusinessRule(format!("User account is {}", user.status)));
        }
        Ok(())
    }

    pub async fn check_in(
        &self,
        user_id: i32,
        source: AttendanceSource,
        recorded_by: Option<i32>,
        notes: Option<&str>,
    ) -> AppResult<AttendanceRecord> {
        self.check_visitor(user_id).await?;
        let record = self
            .repository
            .attendance
            .check_in(user_id, source, recorded_by, notes)
            .await?;
        tracing::info!(user_id, source = %source, "Visitor checked in");
        Ok(record)
    }

    pub async fn check_out(&self, user_id: i32) -> AppResult<AttendanceRecord> {
        let record = self.repository.attendance.check_out(user_id).await?;
        tracing::info!(user_id, "Visitor checked out");
        Ok(record)
    }

    /// Check out when a visit is open, otherwise check in
    pub async fn toggle(
        &self,
        user_id: i32,
        source: AttendanceSource,
        recorded_by: Option<i32>,
    ) -> AppResult<AttendanceEvent> {
        match self.repository.attendance.get_open(user_id).await? {
            Some(_) => Ok(AttendanceEvent {
                action: AttendanceAction::CheckedOut,
                record: self.check_out(user_id).await?,
            }),
            None => Ok(AttendanceEvent {
                action: AttendanceAction::CheckedIn,
                record: self.check_in(user_id, source, recorded_by, None).await?,
            }),
        }
    }

    pub async fn list(&self, query: &AttendanceQuery) -> AppResult<Paginated<AttendanceRecord>> {
        if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
            if from > to {
                return Err(AppError::Validation("date_from is after date_to".to_string()));
            }
        }
        let pagination = Pagination { page: query.page, per_page: query.per_page };
        let (records, total) = self
            .repository
            .attendance
            .search(query, pagination.per_page(), pagination.offset())
            .await?;
        Ok(Paginated::new(records, total, &pagination))
    }

    pub async fn current_visit(&self, user_id: i32) -> AppResult<Option<AttendanceRecord>> {
        self.repository.attendance.get_open(user_id).await
    }

    pub async fn summary(&self, date: Option<NaiveDate>) -> AppResult<AttendanceSummary> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        self.repository.attendance.summary(date).await
    }
}
