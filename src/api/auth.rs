//! Authentication endpoints

use axum::{extract::State, Json};
use validator::Validate;

use crate::{
    error::AppResult,
    models::user::{
        ConfirmPasswordRequest, ConfirmPasswordResponse, LoginRequest, LoginResponse, UpdateProfile, User,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Login with login and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many failed attempts")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let response = state.services.auth.login(&request.login, &request.password).await?;
    Ok(Json(response))
}

/// Get current user information
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.auth.me(claims.user_id).await?;
    Ok(Json(user))
}

/// Update own profile (name, contact, password)
#[utoipa::path(
    put,
    path = "/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Not authenticated or wrong current password")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(profile): Json<UpdateProfile>,
) -> AppResult<Json<User>> {
    profile.validate()?;

    let updated = state.services.auth.update_profile(claims.user_id, &profile).await?;
    Ok(Json(updated))
}

/// Re-check the caller's password before a sensitive action
#[utoipa::path(
    post,
    path = "/auth/confirm-password",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = ConfirmPasswordRequest,
    responses(
        (status = 200, description = "Password confirmed", body = ConfirmPasswordResponse),
        (status = 401, description = "Wrong password"),
        (status = 429, description = "Too many failed attempts")
    )
)]
pub async fn confirm_password(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ConfirmPasswordRequest>,
) -> AppResult<Json<ConfirmPasswordResponse>> {
    state
        .services
        .auth
        .confirm_password(&claims, &request.password)
        .await?;
    Ok(Json(ConfirmPasswordResponse { confirmed: true }))
}
