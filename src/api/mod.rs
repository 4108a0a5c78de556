//! API handlers for Campuslib REST endpoints

pub mod attendance;
pub mod auth;
pub mod backup;
pub mod books;
pub mod catalog;
pub mod dashboard;
pub mod equipment;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod tickets;
pub mod users;

use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{request::Parts, HeaderName, Method},
    routing::{get, post, put},
    Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::UserClaims, AppState};

/// Header carrying the caller's password for sensitive operations
pub const CONFIRM_PASSWORD_HEADER: HeaderName = HeaderName::from_static("x-confirm-password");

/// Extractor for authenticated user from JWT token
///
/// Write requests also check the account behind the token, so a blocked,
/// deleted or re-roled user cannot keep writing until the token expires.
pub struct AuthenticatedUser(pub UserClaims);

async fn bearer_claims(parts: &mut Parts, state: &AppState) -> Result<UserClaims, AppError> {
    let TypedHeader(Authorization(bearer)) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Authentication("Missing or invalid authorization header".to_string()))?;

    state.services.auth.validate_token(bearer.token())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state).await?;

        if !matches!(parts.method, Method::GET | Method::HEAD | Method::OPTIONS) {
            state.services.auth.current_user(&claims).await?;
        }
        Ok(AuthenticatedUser(claims))
    }
}

/// Right a caller must hold before a password confirmation is attempted
pub trait ConfirmRight: Send + Sync + 'static {
    fn check(claims: &UserClaims) -> Result<(), AppError>;
}

macro_rules! confirm_right {
    ($name:ident, $require:ident) => {
        pub struct $name;

        impl ConfirmRight for $name {
            fn check(claims: &UserClaims) -> Result<(), AppError> {
                claims.$require()
            }
        }
    };
}

confirm_right!(WriteCatalog, require_write_catalog);
confirm_right!(WriteUsers, require_write_users);
confirm_right!(WriteEquipment, require_write_equipment);
confirm_right!(ManageBackup, require_backup);

/// Authenticated user who holds `R` and re-entered their password in `X-Confirm-Password`
///
/// Used on destructive endpoints (deletions, restore). The right is checked
/// first so callers without it get 403 and never touch the lockout counter.
/// Failed confirmations count towards the same lockout as the confirm-password endpoint.
pub struct ConfirmedUser<R: ConfirmRight>(pub UserClaims, PhantomData<R>);

#[async_trait]
impl<R: ConfirmRight> FromRequestParts<AppState> for ConfirmedUser<R> {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state).await?;
        R::check(&claims)?;

        let password = parts
            .headers
            .get(&CONFIRM_PASSWORD_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Authentication("Password confirmation required".to_string()))?;

        state.services.auth.confirm_password(&claims, password).await?;
        Ok(ConfirmedUser(claims, PhantomData))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/auth/confirm-password", post(auth::confirm_password))
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/users/:id/role", put(users::set_role))
        .route("/users/:id/loans", get(loans::get_user_loans))
        // Authors and categories
        .route("/authors", get(catalog::list_authors).post(catalog::create_author))
        .route(
            "/authors/:id",
            get(catalog::get_author)
                .put(catalog::update_author)
                .delete(catalog::delete_author),
        )
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route(
            "/categories/:id",
            get(catalog::get_category)
                .put(catalog::update_category)
                .delete(catalog::delete_category),
        )
        // Books and copies
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book).put(books::update_book).delete(books::delete_book),
        )
        .route("/books/:id/copies", get(books::list_copies).post(books::create_copy))
        .route("/books/:id/copies/qr", get(books::get_copies_qr))
        .route("/copies/barcode/:barcode", get(books::get_copy_by_barcode))
        .route(
            "/copies/:id",
            get(books::get_copy).put(books::update_copy).delete(books::delete_copy),
        )
        // Loans
        .route("/loans", get(loans::list_loans).post(loans::create_loan))
        .route("/loans/me", get(loans::my_loans))
        .route("/loans/return-by-barcode", post(loans::return_by_barcode))
        .route("/loans/notify-overdue", post(loans::notify_overdue))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/return", post(loans::return_loan))
        .route("/loans/:id/renew", post(loans::renew_loan))
        // Equipment
        .route("/equipment", get(equipment::list_equipment).post(equipment::create_equipment))
        .route(
            "/equipment/:id",
            get(equipment::get_equipment)
                .put(equipment::update_equipment)
                .delete(equipment::delete_equipment),
        )
        .route("/equipment/:id/checkout", post(equipment::checkout_equipment))
        .route("/equipment/:id/return", post(equipment::return_equipment))
        .route("/equipment/:id/loans", get(equipment::equipment_loans))
        // Attendance
        .route("/attendance", get(attendance::list_attendance))
        .route("/attendance/check-in", post(attendance::check_in))
        .route("/attendance/check-out", post(attendance::check_out))
        .route("/attendance/toggle", post(attendance::toggle))
        .route("/attendance/me", get(attendance::my_visit))
        .route("/attendance/summary", get(attendance::summary))
        // Tickets
        .route("/tickets", get(tickets::list_tickets).post(tickets::issue_ticket))
        .route("/tickets/mine", get(tickets::my_tickets))
        .route("/tickets/verify", post(tickets::verify_ticket))
        .route("/tickets/redeem", post(tickets::redeem_ticket))
        .route("/tickets/:id", get(tickets::get_ticket).delete(tickets::revoke_ticket))
        .route("/tickets/:id/qr", get(tickets::get_ticket_qr))
        // Dashboard
        .route("/dashboard", get(dashboard::get_dashboard))
        // Backup
        .route("/backup/export", get(backup::export_backup))
        .route(
            "/backup/restore",
            post(backup::restore_backup).layer(DefaultBodyLimit::max(backup::RESTORE_BODY_LIMIT)),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
