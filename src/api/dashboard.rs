//! Role dashboard endpoint

use axum::{extract::State, Json};

use crate::{error::AppResult, models::dashboard::Dashboard, AppState};

use super::AuthenticatedUser;

/// Figures for the caller's role
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard; only the section for the caller's role is set", body = Dashboard),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Dashboard>> {
    let dashboard = state.services.dashboard.for_caller(&claims).await?;
    Ok(Json(dashboard))
}
