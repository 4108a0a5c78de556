//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        loan::{CreateLoan, LoanQuery, OverdueReport, ReturnByBarcode},
        LoanDetails, PaginatedLoans,
    },
    AppState,
};

use super::AuthenticatedUser;

/// List loans (staff)
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans", body = PaginatedLoans),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedLoans>> {
    claims.require_read_loans()?;

    let loans = state.services.loans.list_loans(&query).await?;
    Ok(Json(loans))
}

/// Get a loan; borrowers may read their own
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan(id).await?;
    if loan.user_id != claims.user_id {
        claims.require_read_loans()?;
    }
    Ok(Json(loan))
}

/// Get open loans of a user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Open loans", body = Vec<LoanDetails>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    if user_id != claims.user_id {
        claims.require_read_loans()?;
    }

    let loans = state.services.loans.user_loans(user_id).await?;
    Ok(Json(loans))
}

/// Open loans of the caller
#[utoipa::path(
    get,
    path = "/loans/me",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Open loans", body = Vec<LoanDetails>)
    )
)]
pub async fn my_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.user_loans(claims.user_id).await?;
    Ok(Json(loans))
}

/// Lend a copy to a user
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = LoanDetails),
        (status = 404, description = "User or copy not found"),
        (status = 422, description = "Copy unavailable or lending limits reached")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    claims.require_write_loans()?;

    let loan = state.services.loans.create_loan(request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan returned", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Loan already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_write_loans()?;

    let loan = state.services.loans.return_loan(id).await?;
    Ok(Json(loan))
}

/// Return the open loan of a copy scanned at the desk
#[utoipa::path(
    post,
    path = "/loans/return-by-barcode",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = ReturnByBarcode,
    responses(
        (status = 200, description = "Loan returned", body = LoanDetails),
        (status = 404, description = "Copy not found"),
        (status = 422, description = "Copy is not on loan")
    )
)]
pub async fn return_by_barcode(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ReturnByBarcode>,
) -> AppResult<Json<LoanDetails>> {
    claims.require_write_loans()?;

    let loan = state.services.loans.return_by_barcode(&request.barcode).await?;
    Ok(Json(loan))
}

/// Renew a loan; borrowers may renew their own
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan renewed", body = LoanDetails),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Renewal limit reached or loan overdue")
    )
)]
pub async fn renew_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan(id).await?;
    if loan.user_id != claims.user_id {
        claims.require_write_loans()?;
    }

    let renewed = state.services.loans.renew_loan(id).await?;
    Ok(Json(renewed))
}

/// Email reminders to every borrower with overdue loans
#[utoipa::path(
    post,
    path = "/loans/notify-overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Notices sent", body = OverdueReport),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn notify_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<OverdueReport>> {
    claims.require_write_loans()?;

    let report = state.services.loans.notify_overdue().await?;
    Ok(Json(report))
}
