//! Equipment endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::equipment::{
        CheckoutEquipment, CreateEquipment, Equipment, EquipmentLoan, EquipmentQuery, UpdateEquipment,
    },
    AppState,
};

use super::{AuthenticatedUser, ConfirmedUser, WriteEquipment};

/// List equipment
#[utoipa::path(
    get,
    path = "/equipment",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(EquipmentQuery),
    responses(
        (status = 200, description = "Equipment", body = Vec<Equipment>)
    )
)]
pub async fn list_equipment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<EquipmentQuery>,
) -> AppResult<Json<Vec<Equipment>>> {
    claims.require_read_equipment()?;

    let equipment = state.services.equipment.list(&query).await?;
    Ok(Json(equipment))
}

/// Get equipment by ID
#[utoipa::path(
    get,
    path = "/equipment/{id}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Equipment ID")),
    responses(
        (status = 200, description = "Equipment", body = Equipment),
        (status = 404, description = "Equipment not found")
    )
)]
pub async fn get_equipment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Equipment>> {
    claims.require_read_equipment()?;

    let equipment = state.services.equipment.get(id).await?;
    Ok(Json(equipment))
}

/// Create equipment
#[utoipa::path(
    post,
    path = "/equipment",
    tag = "equipment",
    security(("bearer_auth" = [])),
    request_body = CreateEquipment,
    responses(
        (status = 201, description = "Equipment created", body = Equipment),
        (status = 409, description = "Serial number already registered")
    )
)]
pub async fn create_equipment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateEquipment>,
) -> AppResult<(StatusCode, Json<Equipment>)> {
    claims.require_write_equipment()?;
    data.validate()?;

    let equipment = state.services.equipment.create(data).await?;
    Ok((StatusCode::CREATED, Json(equipment)))
}

/// Update equipment
#[utoipa::path(
    put,
    path = "/equipment/{id}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Equipment ID")),
    request_body = UpdateEquipment,
    responses(
        (status = 200, description = "Equipment updated", body = Equipment),
        (status = 404, description = "Equipment not found"),
        (status = 422, description = "Status change not allowed")
    )
)]
pub async fn update_equipment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(data): Json<UpdateEquipment>,
) -> AppResult<Json<Equipment>> {
    claims.require_write_equipment()?;
    data.validate()?;

    let equipment = state.services.equipment.update(id, data).await?;
    Ok(Json(equipment))
}

/// Delete equipment that is not checked out
#[utoipa::path(
    delete,
    path = "/equipment/{id}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Equipment ID"),
        ("X-Confirm-Password" = String, Header, description = "Caller's password")
    ),
    responses(
        (status = 204, description = "Equipment deleted"),
        (status = 404, description = "Equipment not found"),
        (status = 422, description = "Equipment is checked out")
    )
)]
pub async fn delete_equipment(
    State(state): State<AppState>,
    _: ConfirmedUser<WriteEquipment>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.equipment.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check out equipment to a user
#[utoipa::path(
    post,
    path = "/equipment/{id}/checkout",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Equipment ID")),
    request_body = CheckoutEquipment,
    responses(
        (status = 201, description = "Checked out", body = EquipmentLoan),
        (status = 404, description = "Equipment or user not found"),
        (status = 422, description = "Equipment not available")
    )
)]
pub async fn checkout_equipment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(data): Json<CheckoutEquipment>,
) -> AppResult<(StatusCode, Json<EquipmentLoan>)> {
    claims.require_write_equipment()?;

    let loan = state.services.equipment.checkout(id, data).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return checked out equipment
#[utoipa::path(
    post,
    path = "/equipment/{id}/return",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Equipment ID")),
    responses(
        (status = 200, description = "Returned", body = EquipmentLoan),
        (status = 422, description = "Equipment is not checked out")
    )
)]
pub async fn return_equipment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<EquipmentLoan>> {
    claims.require_write_equipment()?;

    let loan = state.services.equipment.return_equipment(id).await?;
    Ok(Json(loan))
}

/// Checkout history of a piece of equipment
#[utoipa::path(
    get,
    path = "/equipment/{id}/loans",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Equipment ID")),
    responses(
        (status = 200, description = "Checkouts, newest first", body = Vec<EquipmentLoan>),
        (status = 404, description = "Equipment not found")
    )
)]
pub async fn equipment_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<EquipmentLoan>>> {
    claims.require_write_equipment()?;

    let loans = state.services.equipment.loans_history(id).await?;
    Ok(Json(loans))
}
