//! Attendance (library visit) model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

/// How a visit was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceSource {
    Manual,
    Qr,
}

text_enum!(AttendanceSource {
    Manual => "manual",
    Qr => "qr",
});

/// Visit record; `check_out` is empty while the visitor is present
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AttendanceRecord {
    pub id: i32,
    pub user_id: i32,
    pub user_login: String,
    pub user_firstname: Option<String>,
    pub user_lastname: Option<String>,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub source: AttendanceSource,
    pub recorded_by: Option<i32>,
    pub notes: Option<String>,
}

/// Check-in / check-out request
#[derive(Debug, Deserialize, ToSchema)]
pub struct AttendanceRequest {
    pub user_id: i32,
    pub notes: Option<String>,
}

/// Query parameters for attendance
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct AttendanceQuery {
    pub user_id: Option<i32>,
    /// Start date (YYYY-MM-DD)
    pub date_from: Option<NaiveDate>,
    /// End date, inclusive (YYYY-MM-DD)
    pub date_to: Option<NaiveDate>,
    /// Only visitors currently present
    pub open_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Query parameters for the daily summary
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct SummaryQuery {
    /// Day to summarize (YYYY-MM-DD, default: today)
    pub date: Option<NaiveDate>,
}

/// Daily attendance summary
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AttendanceSummary {
    pub date: NaiveDate,
    /// Check-ins that day
    pub visits: i64,
    pub distinct_visitors: i64,
    /// Open sessions right now
    pub present_now: i64,
    /// Average length of closed visits
    pub average_minutes: Option<f64>,
}

/// Whether a toggle opened or closed a visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceAction {
    CheckedIn,
    CheckedOut,
}

/// Result of a check-in/check-out toggle
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendanceEvent {
    pub action: AttendanceAction,
    pub record: AttendanceRecord,
}
