//! User management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        user::{CreateUser, CreatedUser, DeleteUserQuery, SetRole, UpdateUser, User, UserQuery},
        PaginatedUsers,
    },
    AppState,
};

use super::{AuthenticatedUser, ConfirmedUser, WriteUsers};

/// List users with search and pagination
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(UserQuery),
    responses(
        (status = 200, description = "List of users", body = PaginatedUsers),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<PaginatedUsers>> {
    claims.require_read_users()?;

    let users = state.services.users.list(&query).await?;
    Ok(Json(users))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    claims.require_self_or_read_users(id)?;

    let user = state.services.users.get(id).await?;
    Ok(Json(user))
}

/// Create a new user
///
/// When no password is given one is generated and returned once.
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = CreatedUser),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Insufficient rights"),
        (status = 409, description = "Login or student number already exists")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(user): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<CreatedUser>)> {
    claims.require_write_users()?;
    user.validate()?;

    let created = state.services.users.create(&claims, user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update an existing user
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(user): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    claims.require_write_users()?;
    user.validate()?;

    let updated = state.services.users.update(&claims, id, user).await?;
    Ok(Json(updated))
}

/// Change a user's role (admin only)
#[utoipa::path(
    put,
    path = "/users/{id}/role",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    request_body = SetRole,
    responses(
        (status = 200, description = "Role updated", body = User),
        (status = 403, description = "Admin privileges required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn set_role(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<SetRole>,
) -> AppResult<Json<User>> {
    let updated = state.services.users.set_role(&claims, id, request.role).await?;
    Ok(Json(updated))
}

/// Delete a user (requires password confirmation)
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        ("X-Confirm-Password" = String, Header, description = "Caller's password"),
        DeleteUserQuery
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Password confirmation failed"),
        (status = 404, description = "User not found"),
        (status = 422, description = "User has open loans")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    ConfirmedUser(claims, _): ConfirmedUser<WriteUsers>,
    Path(id): Path<i32>,
    Query(params): Query<DeleteUserQuery>,
) -> AppResult<StatusCode> {
    state
        .services
        .users
        .delete(&claims, id, params.force.unwrap_or(false))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
