//! QR ticket endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::ticket::{
        IssueTicket, IssuedTicket, RedeemOutcome, ScanTicket, TicketPreview, TicketQrQuery, TicketQuery,
        TicketState, TicketView,
    },
    services::tickets::TicketQr,
    AppState,
};

use super::AuthenticatedUser;

/// Filter for the caller's own tickets
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MyTicketsQuery {
    pub status: Option<TicketState>,
}

/// Inline QR image
#[derive(Serialize, ToSchema)]
pub struct TicketQrData {
    /// `data:image/...;base64,...`
    pub data_uri: String,
}

/// Issue a ticket
///
/// Students issue tickets for themselves; staff may name any user.
#[utoipa::path(
    post,
    path = "/tickets",
    tag = "tickets",
    security(("bearer_auth" = [])),
    request_body = IssueTicket,
    responses(
        (status = 201, description = "Ticket issued", body = IssuedTicket),
        (status = 400, description = "Items do not match the purpose"),
        (status = 403, description = "Ticket for another user"),
        (status = 422, description = "Copy or equipment unavailable, or lending limits reached")
    )
)]
pub async fn issue_ticket(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<IssueTicket>,
) -> AppResult<(StatusCode, Json<IssuedTicket>)> {
    let issued = state.services.tickets.issue(&claims, request).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// Check a scanned token without consuming it
#[utoipa::path(
    post,
    path = "/tickets/verify",
    tag = "tickets",
    security(("bearer_auth" = [])),
    request_body = ScanTicket,
    responses(
        (status = 200, description = "Ticket is usable", body = TicketPreview),
        (status = 410, description = "Ticket expired"),
        (status = 422, description = "Invalid, used or revoked ticket")
    )
)]
pub async fn verify_ticket(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ScanTicket>,
) -> AppResult<Json<TicketPreview>> {
    claims.require_redeem_tickets()?;

    let preview = state.services.tickets.verify(&request.token).await?;
    Ok(Json(preview))
}

/// Consume a scanned token and perform its action
#[utoipa::path(
    post,
    path = "/tickets/redeem",
    tag = "tickets",
    security(("bearer_auth" = [])),
    request_body = ScanTicket,
    responses(
        (status = 200, description = "Ticket redeemed, with per-item results", body = RedeemOutcome),
        (status = 410, description = "Ticket expired"),
        (status = 422, description = "Invalid, used or revoked ticket")
    )
)]
pub async fn redeem_ticket(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ScanTicket>,
) -> AppResult<Json<RedeemOutcome>> {
    claims.require_redeem_tickets()?;

    let outcome = state.services.tickets.redeem(&claims, &request.token).await?;
    Ok(Json(outcome))
}

/// Tickets of the caller
#[utoipa::path(
    get,
    path = "/tickets/mine",
    tag = "tickets",
    security(("bearer_auth" = [])),
    params(MyTicketsQuery),
    responses(
        (status = 200, description = "Tickets, newest first", body = Vec<TicketView>)
    )
)]
pub async fn my_tickets(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<MyTicketsQuery>,
) -> AppResult<Json<Vec<TicketView>>> {
    let tickets = state.services.tickets.list_mine(&claims, query.status).await?;
    Ok(Json(tickets))
}

/// List tickets (staff)
#[utoipa::path(
    get,
    path = "/tickets",
    tag = "tickets",
    security(("bearer_auth" = [])),
    params(TicketQuery),
    responses(
        (status = 200, description = "Tickets, newest first", body = Vec<TicketView>),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_tickets(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<TicketQuery>,
) -> AppResult<Json<Vec<TicketView>>> {
    claims.require_staff()?;

    let tickets = state.services.tickets.list(&query).await?;
    Ok(Json(tickets))
}

/// Get a ticket
#[utoipa::path(
    get,
    path = "/tickets/{id}",
    tag = "tickets",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket", body = TicketView),
        (status = 403, description = "Not your ticket"),
        (status = 404, description = "Ticket not found")
    )
)]
pub async fn get_ticket(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TicketView>> {
    let ticket = state.services.tickets.get(&claims, id).await?;
    Ok(Json(ticket))
}

/// Revoke an issued ticket
///
/// The record stays, only its status changes, so no password confirmation is asked.
#[utoipa::path(
    delete,
    path = "/tickets/{id}",
    tag = "tickets",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket revoked", body = TicketView),
        (status = 404, description = "Ticket not found"),
        (status = 422, description = "Ticket is no longer issued")
    )
)]
pub async fn revoke_ticket(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TicketView>> {
    let ticket = state.services.tickets.revoke(&claims, id).await?;
    Ok(Json(ticket))
}

/// QR image of an issued ticket
///
/// Downloads the image as an attachment, or returns a data URI with `inline=true`.
#[utoipa::path(
    get,
    path = "/tickets/{id}/qr",
    tag = "tickets",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Ticket ID"), TicketQrQuery),
    responses(
        (status = 200, description = "QR image (attachment) or data URI", body = TicketQrData),
        (status = 404, description = "Ticket not found"),
        (status = 410, description = "Ticket expired"),
        (status = 502, description = "QR service unavailable")
    )
)]
pub async fn get_ticket_qr(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(query): Query<TicketQrQuery>,
) -> AppResult<Response> {
    let qr = state
        .services
        .tickets
        .ticket_qr(&claims, id, query.inline.unwrap_or(false))
        .await?;

    Ok(match qr {
        TicketQr::DataUri(data_uri) => Json(TicketQrData { data_uri }).into_response(),
        TicketQr::Image { mime_type, bytes } => {
            let extension = if mime_type == "image/svg+xml" { "svg" } else { "png" };
            let disposition = format!("attachment; filename=\"ticket-{}.{}\"", id, extension);
            (
                [
                    (header::CONTENT_TYPE, mime_type.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
    })
}
