//! Role dashboards

use chrono::{Datelike, NaiveDate, Utc};

use crate::{
    error::AppResult,
    models::{
        dashboard::{
            AdminDashboard, Dashboard, EquipmentStatusCount, LibrarianDashboard, RoleCount,
            ScannerDashboard, StudentDashboard,
        },
        user::Role,
        UserClaims,
    },
    repository::Repository,
};

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

#[derive(Clone)]
pub struct DashboardService {
    repository: Repository,
}

impl DashboardService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn for_caller(&self, caller: &UserClaims) -> AppResult<Dashboard> {
        let mut dashboard = Dashboard::empty(caller.role);
        match caller.role {
            Role::Admin => dashboard.admin = Some(self.admin().await?),
            Role::Librarian => dashboard.librarian = Some(self.librarian().await?),
            Role::Student => dashboard.student = Some(self.student(caller.user_id).await?),
            Role::Scanner => dashboard.scanner = Some(self.scanner().await?),
        }
        Ok(dashboard)
    }

    async fn admin(&self) -> AppResult<AdminDashboard> {
        let today = Utc::now().date_naive();
        let users_by_role = self
            .repository
            .stats
            .users_by_role()
            .await?
            .into_iter()
            .map(|(role, count)| RoleCount { role, count })
            .collect();
        let equipment_by_status = self
            .repository
            .equipment
            .count_by_status()
            .await?
            .into_iter()
            .map(|(status, count)| EquipmentStatusCount { status, count })
            .collect();

        Ok(AdminDashboard {
            users_by_role,
            catalog: self.repository.stats.catalog_totals().await?,
            equipment_by_status,
            loans: self.repository.stats.loan_totals().await?,
            attendance: self.repository.attendance.summary(today).await?,
        })
    }

    async fn librarian(&self) -> AppResult<LibrarianDashboard> {
        let today = Utc::now().date_naive();
        Ok(LibrarianDashboard {
            loans: self.repository.stats.loan_totals().await?,
            tickets: self.repository.stats.ticket_totals_today().await?,
            attendance: self.repository.attendance.summary(today).await?,
            equipment_in_use: self.repository.stats.equipment_in_use().await?,
        })
    }

    async fn student(&self, user_id: i32) -> AppResult<StudentDashboard> {
        let today = Utc::now().date_naive();
        let open_loans = self.repository.loans.open_for_user(user_id).await?;
        let overdue_loans = open_loans.iter().filter(|l| l.is_overdue).count() as i64;

        Ok(StudentDashboard {
            open_loans,
            overdue_loans,
            active_tickets: self.repository.stats.active_tickets_for_user(user_id).await?,
            visits_this_month: self
                .repository
                .attendance
                .count_visits_since(user_id, first_of_month(today))
                .await?,
            current_visit: self.repository.attendance.get_open(user_id).await?,
        })
    }

    async fn scanner(&self) -> AppResult<ScannerDashboard> {
        let today = Utc::now().date_naive();
        let tickets = self.repository.stats.ticket_totals_today().await?;
        let attendance = self.repository.attendance.summary(today).await?;
        Ok(ScannerDashboard {
            tickets_redeemed_today: tickets.redeemed_today,
            check_ins_today: attendance.visits,
            present_now: attendance.present_now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_of_month() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(first_of_month(day), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }
}
