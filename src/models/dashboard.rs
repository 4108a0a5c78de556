//! Per-role dashboard figures

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use super::{
    attendance::{AttendanceRecord, AttendanceSummary},
    equipment::EquipmentStatus,
    loan::LoanDetails,
    user::Role,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleCount {
    pub role: Role,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EquipmentStatusCount {
    pub status: EquipmentStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct CatalogTotals {
    pub books: i64,
    pub copies: i64,
    pub authors: i64,
    pub categories: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct LoanTotals {
    pub active: i64,
    pub overdue: i64,
    pub due_today: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct TicketTotals {
    pub issued_today: i64,
    pub redeemed_today: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminDashboard {
    pub users_by_role: Vec<RoleCount>,
    pub catalog: CatalogTotals,
    pub equipment_by_status: Vec<EquipmentStatusCount>,
    pub loans: LoanTotals,
    pub attendance: AttendanceSummary,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibrarianDashboard {
    pub loans: LoanTotals,
    pub tickets: TicketTotals,
    pub attendance: AttendanceSummary,
    pub equipment_in_use: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StudentDashboard {
    pub open_loans: Vec<LoanDetails>,
    pub overdue_loans: i64,
    /// Issued tickets not yet expired
    pub active_tickets: i64,
    pub visits_this_month: i64,
    /// Current visit, if checked in
    pub current_visit: Option<AttendanceRecord>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScannerDashboard {
    pub tickets_redeemed_today: i64,
    pub check_ins_today: i64,
    pub present_now: i64,
}

/// Dashboard of the caller's role; exactly one section is present
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Dashboard {
    pub role: Role,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminDashboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub librarian: Option<LibrarianDashboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentDashboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner: Option<ScannerDashboard>,
}

impl Dashboard {
    pub fn empty(role: Role) -> Self {
        Self {
            role,
            generated_at: Utc::now(),
            admin: None,
            librarian: None,
            student: None,
            scanner: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_role_section_serialized() {
        let mut dashboard = Dashboard::empty(Role::Scanner);
        dashboard.scanner = Some(ScannerDashboard {
            tickets_redeemed_today: 4,
            check_ins_today: 12,
            present_now: 3,
        });

        let json = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(json["role"], "scanner");
        assert_eq!(json["scanner"]["present_now"], 3);
        assert!(json.get("admin").is_none());
        assert!(json.get("student").is_none());
    }
}
