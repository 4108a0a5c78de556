//! Loan (borrow) model and lending policy

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{config::LoansConfig, error::AppError};

/// Loan model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub copy_id: i32,
    pub book_id: i32,
    pub ticket_id: Option<Uuid>,
    pub date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub renew_date: Option<DateTime<Utc>>,
    pub nb_renews: i16,
    pub returned_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Loan with book, copy and borrower for display
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub renew_date: Option<DateTime<Utc>>,
    pub nb_renews: i16,
    pub returned_date: Option<DateTime<Utc>>,
    pub book_id: i32,
    pub book_title: String,
    pub copy_id: i32,
    pub barcode: String,
    pub user_id: i32,
    pub user_login: String,
    pub user_firstname: Option<String>,
    pub user_lastname: Option<String>,
    pub is_overdue: bool,
}

/// Overdue loan with the borrower's contact, for reminder emails
#[derive(Debug, Clone, FromRow)]
pub struct OverdueLoan {
    pub loan_id: i32,
    pub user_id: i32,
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub login: String,
    pub book_title: String,
    pub barcode: String,
    pub due_date: DateTime<Utc>,
}

/// Overdue reminder run result
#[derive(Debug, Serialize, ToSchema)]
pub struct OverdueReport {
    /// Users with at least one overdue loan
    pub users: usize,
    /// Reminders actually sent
    pub sent: usize,
    /// Users without an email address
    pub skipped: usize,
}

/// Loan query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    pub user_id: Option<i32>,
    /// Only open loans (default: true)
    pub active: Option<bool>,
    /// Only loans past their due date
    pub overdue: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create loan request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLoan {
    pub user_id: i32,
    /// Copy id (optional if barcode provided)
    pub copy_id: Option<i32>,
    /// Copy barcode
    pub barcode: Option<String>,
    /// Bypass lending limits (not availability)
    #[serde(default)]
    pub force: bool,
}

/// Return by copy barcode request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReturnByBarcode {
    pub barcode: String,
}

/// Lending limits applied to book loans
#[derive(Debug, Clone)]
pub struct LoanPolicy {
    pub duration: Duration,
    pub max_loans: i64,
    pub max_renewals: i16,
    pub block_when_overdue: bool,
}

impl From<&LoansConfig> for LoanPolicy {
    fn from(config: &LoansConfig) -> Self {
        Self {
            duration: Duration::days(config.duration_days),
            max_loans: config.max_loans,
            max_renewals: config.max_renewals,
            block_when_overdue: config.block_when_overdue,
        }
    }
}

impl LoanPolicy {
    pub fn due_date(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + self.duration
    }

    /// Whether a user with `active` open loans, `overdue` of them late, may borrow `count` more
    pub fn check_borrow(&self, active: i64, overdue: i64, count: i64) -> Result<(), AppError> {
        if self.block_when_overdue && overdue > 0 {
            return Err(AppError::BusinessRule(format!(
                "User has {} overdue loan(s)",
                overdue
            )));
        }
        if active + count > self.max_loans {
            return Err(AppError::BusinessRule(format!(
                "Maximum loans reached ({}/{})",
                active, self.max_loans
            )));
        }
        Ok(())
    }

    pub fn check_renew(&self, loan: &Loan, now: DateTime<Utc>) -> Result<(), AppError> {
        if loan.returned_date.is_some() {
            return Err(AppError::BusinessRule("Cannot renew a returned loan".to_string()));
        }
        if loan.due_date < now {
            return Err(AppError::BusinessRule("Cannot renew an overdue loan".to_string()));
        }
        if loan.nb_renews >= self.max_renewals {
            return Err(AppError::BusinessRule(format!(
                "Maximum renewals reached ({}/{})",
                loan.nb_renews, self.max_renewals
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LoanPolicy {
        LoanPolicy::from(&LoansConfig {
            duration_days: 14,
            max_loans: 3,
            max_renewals: 1,
            block_when_overdue: true,
            equipment_duration_days: 1,
        })
    }

    fn loan(due_in_days: i64, nb_renews: i16) -> Loan {
        let now = Utc::now();
        Loan {
            id: 1,
            user_id: 1,
            copy_id: 1,
            book_id: 1,
            ticket_id: None,
            date: now - Duration::days(3),
            due_date: now + Duration::days(due_in_days),
            renew_date: None,
            nb_renews,
            returned_date: None,
            notes: None,
        }
    }

    #[test]
    fn test_due_date() {
        let start = Utc::now();
        assert_eq!(policy().due_date(start), start + Duration::days(14));
    }

    #[test]
    fn test_check_borrow_limits() {
        let p = policy();
        assert!(p.check_borrow(0, 0, 3).is_ok());
        assert!(p.check_borrow(2, 0, 1).is_ok());
        assert!(p.check_borrow(2, 0, 2).is_err());
        assert!(p.check_borrow(0, 1, 1).is_err());

        let lenient = LoanPolicy { block_when_overdue: false, ..p };
        assert!(lenient.check_borrow(1, 1, 1).is_ok());
    }

    #[test]
    fn test_check_renew() {
        let p = policy();
        let now = Utc::now();
        assert!(p.check_renew(&loan(5, 0), now).is_ok());
        assert!(p.check_renew(&loan(5, 1), now).is_err());
        assert!(p.check_renew(&loan(-1, 0), now).is_err());

        let mut returned = loan(5, 0);
        returned.returned_date = Some(now);
        assert!(p.check_renew(&returned, now).is_err());
    }
}
