//! Attendance (library visits) endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        attendance::{
            AttendanceEvent, AttendanceQuery, AttendanceRecord, AttendanceRequest, AttendanceSource,
            AttendanceSummary, SummaryQuery,
        },
        PaginatedAttendance,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Record a visitor entering the library
#[utoipa::path(
    post,
    path = "/attendance/check-in",
    tag = "attendance",
    security(("bearer_auth" = [])),
    request_body = AttendanceRequest,
    responses(
        (status = 201, description = "Visit opened", body = AttendanceRecord),
        (status = 422, description = "User is already checked in")
    )
)]
pub async fn check_in(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<AttendanceRequest>,
) -> AppResult<(StatusCode, Json<AttendanceRecord>)> {
    claims.require_write_attendance()?;

    let record = state
        .services
        .attendance
        .check_in(
            request.user_id,
            AttendanceSource::Manual,
            Some(claims.user_id),
            request.notes.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Record a visitor leaving the library
#[utoipa::path(
    post,
    path = "/attendance/check-out",
    tag = "attendance",
    security(("bearer_auth" = [])),
    request_body = AttendanceRequest,
    responses(
        (status = 200, description = "Visit closed", body = AttendanceRecord),
        (status = 422, description = "User is not checked in")
    )
)]
pub async fn check_out(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<AttendanceRequest>,
) -> AppResult<Json<AttendanceRecord>> {
    claims.require_write_attendance()?;

    let record = state.services.attendance.check_out(request.user_id).await?;
    Ok(Json(record))
}

/// Check out when present, check in otherwise
#[utoipa::path(
    post,
    path = "/attendance/toggle",
    tag = "attendance",
    security(("bearer_auth" = [])),
    request_body = AttendanceRequest,
    responses(
        (status = 200, description = "Visit opened or closed", body = AttendanceEvent)
    )
)]
pub async fn toggle(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<AttendanceRequest>,
) -> AppResult<Json<AttendanceEvent>> {
    claims.require_write_attendance()?;

    let event = state
        .services
        .attendance
        .toggle(request.user_id, AttendanceSource::Manual, Some(claims.user_id))
        .await?;
    Ok(Json(event))
}

/// List visits
#[utoipa::path(
    get,
    path = "/attendance",
    tag = "attendance",
    security(("bearer_auth" = [])),
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Visits, newest first", body = PaginatedAttendance),
        (status = 400, description = "Invalid date range")
    )
)]
pub async fn list_attendance(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<AttendanceQuery>,
) -> AppResult<Json<PaginatedAttendance>> {
    claims.require_read_attendance()?;

    let records = state.services.attendance.list(&query).await?;
    Ok(Json(records))
}

/// The caller's open visit, if any
#[utoipa::path(
    get,
    path = "/attendance/me",
    tag = "attendance",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Open visit or null", body = Option<AttendanceRecord>)
    )
)]
pub async fn my_visit(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Option<AttendanceRecord>>> {
    let record = state.services.attendance.current_visit(claims.user_id).await?;
    Ok(Json(record))
}

/// Daily attendance figures
#[utoipa::path(
    get,
    path = "/attendance/summary",
    tag = "attendance",
    security(("bearer_auth" = [])),
    params(SummaryQuery),
    responses(
        (status = 200, description = "Summary of the day", body = AttendanceSummary)
    )
)]
pub async fn summary(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<AttendanceSummary>> {
    claims.require_read_attendance()?;

    let summary = state.services.attendance.summary(query.date).await?;
    Ok(Json(summary))
}
