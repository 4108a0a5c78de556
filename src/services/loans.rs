//! Loan management service

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        copy::{normalize_barcode, BookCopy},
        loan::{CreateLoan, Loan, LoanDetails, LoanPolicy, LoanQuery, OverdueReport},
        Paginated, Pagination, User,
    },
    repository::Repository,
    services::email::{EmailService, OverdueLine},
};

/// Refuse loans to accounts that are not active
fn check_borrower(user: &User) -> AppResult<()> {
    if user.is_active() {
        Ok(())
    } else {
        Err(AppError::BusinessRule(format!("User account is {}", user.status)))
    }
}

fn check_copy_available(copy: &BookCopy) -> AppResult<()> {
    if copy.loan_id.is_some() {
        return Err(AppError::BusinessRule(format!("Copy {} is already on loan", copy.barcode)));
    }
    if !copy.is_available() {
        return Err(AppError::BusinessRule(format!("Copy {} is not available for loan", copy.barcode)));
    }
    Ok(())
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    policy: LoanPolicy,
    email: EmailService,
}

impl LoansService {
    pub fn new(repository: Repository, policy: LoanPolicy, email: EmailService) -> Self {
        Self { repository, policy, email }
    }

    pub fn policy(&self) -> &LoanPolicy {
        &self.policy
    }

    async fn resolve_copy(&self, copy_id: Option<i32>, barcode: Option<&str>) -> AppResult<BookCopy> {
        match (copy_id, barcode) {
            (Some(id), _) => self.repository.copies.get_by_id(id).await,
            (None, Some(barcode)) => {
                let barcode = normalize_barcode(barcode).map_err(AppError::Validation)?;
                self.repository.copies.get_by_barcode(&barcode).await
            }
            (None, None) => Err(AppError::Validation("copy_id or barcode is required".to_string())),
        }
    }

    /// Lend one copy after availability and policy checks
    pub(crate) async fn lend(
        &self,
        user: &User,
        copy: &BookCopy,
        force: bool,
        ticket_id: Option<Uuid>,
    ) -> AppResult<Loan> {
        check_borrower(user)?;
        check_copy_available(copy)?;

        if !force {
            let (active, overdue) = self.repository.loans.count_for_user(user.id).await?;
            self.policy.check_borrow(active, overdue, 1)?;
        }

        let due_date = self.policy.due_date(Utc::now());
        let loan = self
            .repository
            .loans
            .create(user.id, copy.id, copy.book_id, due_date, ticket_id)
            .await?;

        tracing::info!(
            loan_id = loan.id,
            user_id = user.id,
            copy_id = copy.id,
            due_date = %loan.due_date,
            forced = force,
            "Loan created"
        );
        Ok(loan)
    }

    /// Create a loan from a desk request
    pub async fn create_loan(&self, data: CreateLoan) -> AppResult<LoanDetails> {
        let user = self.repository.users.get_by_id(data.user_id).await?;
        let copy = self.resolve_copy(data.copy_id, data.barcode.as_deref()).await?;
        let loan = self.lend(&user, &copy, data.force, None).await?;
        self.repository.loans.get_details(loan.id).await
    }

    pub async fn get_loan(&self, id: i32) -> AppResult<LoanDetails> {
        self.repository.loans.get_details(id).await
    }

    pub async fn return_loan(&self, id: i32) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.mark_returned(id).await?;
        tracing::info!(loan_id = id, user_id = loan.user_id, copy_id = loan.copy_id, "Loan returned");
        self.repository.loans.get_details(id).await
    }

    pub async fn return_by_barcode(&self, barcode: &str) -> AppResult<LoanDetails> {
        let copy = self.resolve_copy(None, Some(barcode)).await?;
        let loan_id = copy
            .loan_id
            .ok_or_else(|| AppError::BusinessRule(format!("Copy {} is not on loan", copy.barcode)))?;
        self.return_loan(loan_id).await
    }

    /// Close the open loan on `copy_id`, which must belong to `user_id`
    pub(crate) async fn return_copy_for_user(&self, user_id: i32, copy_id: i32) -> AppResult<Loan> {
        let loan = self
            .repository
            .loans
            .get_open_for_copy(copy_id)
            .await?
            .filter(|loan| loan.user_id == user_id)
            .ok_or_else(|| AppError::BusinessRule(format!("Copy {} is not on loan to this user", copy_id)))?;

        let loan = self.repository.loans.mark_returned(loan.id).await?;
        tracing::info!(loan_id = loan.id, user_id, copy_id, "Loan returned");
        Ok(loan)
    }

    pub async fn renew_loan(&self, id: i32) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.get_by_id(id).await?;
        let now = Utc::now();
        self.policy.check_renew(&loan, now)?;

        let renewed = self.repository.loans.renew(id, self.policy.due_date(now)).await?;
        tracing::info!(loan_id = id, nb_renews = renewed.nb_renews, due_date = %renewed.due_date, "Loan renewed");
        self.repository.loans.get_details(id).await
    }

    pub async fn list_loans(&self, query: &LoanQuery) -> AppResult<Paginated<LoanDetails>> {
        let pagination = Pagination { page: query.page, per_page: query.per_page };
        let (loans, total) = self
            .repository
            .loans
            .search(query, pagination.per_page(), pagination.offset())
            .await?;
        Ok(Paginated::new(loans, total, &pagination))
    }

    /// Open loans of a user
    pub async fn user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.users.get_by_id(user_id).await?;
        self.repository.loans.open_for_user(user_id).await
    }

    /// Email every borrower holding overdue loans
    pub async fn notify_overdue(&self) -> AppResult<OverdueReport> {
        let overdue = self.repository.loans.overdue().await?;

        let mut report = OverdueReport { users: 0, sent: 0, skipped: 0 };
        let mut rest = overdue.as_slice();

        while let Some(first) = rest.first() {
            let count = rest.iter().take_while(|l| l.user_id == first.user_id).count();
            let (group, tail) = rest.split_at(count);
            rest = tail;
            report.users += 1;

            let Some(email) = first.email.as_deref().filter(|e| !e.is_empty()) else {
                report.skipped += 1;
                continue;
            };
            if !self.email.is_enabled() {
                report.skipped += 1;
                continue;
            }

            let name = match (&first.firstname, &first.lastname) {
                (Some(f), Some(l)) => format!("{} {}", f, l),
                (None, Some(l)) => l.clone(),
                (Some(f), None) => f.clone(),
                (None, None) => first.login.clone(),
            };
            let lines: Vec<OverdueLine> = group
                .iter()
                .map(|l| OverdueLine {
                    title: l.book_title.clone(),
                    barcode: l.barcode.clone(),
                    due_date: l.due_date,
                })
                .collect();

            match self.email.send_overdue_notice(email, &name, &lines).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    tracing::warn!(user_id = first.user_id, "Overdue notice not sent: {}", e);
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(users = report.users, sent = report.sent, skipped = report.skipped, "Overdue notices processed");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{copy::CopyStatus, user::{Role, UserStatus}};

    fn copy() -> BookCopy {
        BookCopy {
            id: 1,
            book_id: 1,
            barcode: "LIB-001".to_string(),
            call_number: None,
            location: None,
            borrowable: true,
            status: CopyStatus::Active,
            notes: None,
            crea_date: Utc::now(),
            modif_date: None,
            loan_id: None,
            due_date: None,
        }
    }

    #[test]
    fn test_copy_availability_messages() {
        assert!(check_copy_available(&copy()).is_ok());

        let mut on_loan = copy();
        on_loan.loan_id = Some(4);
        let err = check_copy_available(&on_loan).unwrap_err();
        assert!(err.to_string().contains("already on loan"));

        let mut reference = copy();
        reference.borrowable = false;
        let err = check_copy_available(&reference).unwrap_err();
        assert!(err.to_string().contains("not available"));
    }

    #[test]
    fn test_blocked_borrower_refused() {
        let mut user = User {
            id: 1,
            login: "jdoe".to_string(),
            password: None,
            firstname: None,
            lastname: None,
            email: None,
            student_number: None,
            department: None,
            phone: None,
            language: None,
            role: Role::Student,
            status: UserStatus::Active,
            crea_date: Utc::now(),
            modif_date: None,
        };
        assert!(check_borrower(&user).is_ok());
        user.status = UserStatus::Blocked;
        assert!(matches!(check_borrower(&user), Err(AppError::BusinessRule(_))));
    }
}
