//! Backup endpoints (admin only)

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    error::AppResult,
    models::backup::{BackupSnapshot, RestoreReport},
    AppState,
};

use super::{AuthenticatedUser, ConfirmedUser, ManageBackup};

/// Largest snapshot accepted by the restore endpoint
pub const RESTORE_BODY_LIMIT: usize = 256 * 1024 * 1024;

/// Download a snapshot of all data
#[utoipa::path(
    get,
    path = "/backup/export",
    tag = "backup",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Snapshot file", body = BackupSnapshot),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn export_backup(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Response> {
    claims.require_backup()?;

    let snapshot = state.services.backup.export().await?;
    let filename = format!(
        "attachment; filename=\"campuslib-backup-{}.json\"",
        snapshot.created_at.format("%Y%m%d-%H%M%S")
    );
    Ok(([(header::CONTENT_DISPOSITION, filename)], Json(snapshot)).into_response())
}

/// Replace all data with a snapshot (requires password confirmation)
#[utoipa::path(
    post,
    path = "/backup/restore",
    tag = "backup",
    security(("bearer_auth" = [])),
    params(
        ("X-Confirm-Password" = String, Header, description = "Caller's password")
    ),
    request_body = BackupSnapshot,
    responses(
        (status = 200, description = "Rows restored per table", body = RestoreReport),
        (status = 400, description = "Unsupported version, bad checksum or unknown table"),
        (status = 401, description = "Password confirmation failed"),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn restore_backup(
    State(state): State<AppState>,
    ConfirmedUser(claims, _): ConfirmedUser<ManageBackup>,
    Json(snapshot): Json<BackupSnapshot>,
) -> AppResult<Json<RestoreReport>> {
    let report = state.services.backup.restore(snapshot, claims.user_id).await?;
    Ok(Json(report))
}
