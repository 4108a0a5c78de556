//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{attendance, auth, backup, books, catalog, dashboard, equipment, health, loans, tickets, users};

/// Registers the bearer token scheme referenced by secured paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campuslib API",
        version = "1.0.0",
        description = "University library REST API: catalog, loans, equipment, attendance and QR tickets"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        auth::update_profile,
        auth::confirm_password,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::set_role,
        users::delete_user,
        // Authors and categories
        catalog::list_authors,
        catalog::get_author,
        catalog::create_author,
        catalog::update_author,
        catalog::delete_author,
        catalog::list_categories,
        catalog::get_category,
        catalog::create_category,
        catalog::update_category,
        catalog::delete_category,
        // Books and copies
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::list_copies,
        books::create_copy,
        books::get_copies_qr,
        books::get_copy,
        books::get_copy_by_barcode,
        books::update_copy,
        books::delete_copy,
        // Loans
        loans::list_loans,
        loans::get_loan,
        loans::get_user_loans,
        loans::my_loans,
        loans::create_loan,
        loans::return_loan,
        loans::return_by_barcode,
        loans::renew_loan,
        loans::notify_overdue,
        // Equipment
        equipment::list_equipment,
        equipment::get_equipment,
        equipment::create_equipment,
        equipment::update_equipment,
        equipment::delete_equipment,
        equipment::checkout_equipment,
        equipment::return_equipment,
        equipment::equipment_loans,
        // Attendance
        attendance::check_in,
        attendance::check_out,
        attendance::toggle,
        attendance::list_attendance,
        attendance::my_visit,
        attendance::summary,
        // Tickets
        tickets::issue_ticket,
        tickets::verify_ticket,
        tickets::redeem_ticket,
        tickets::my_tickets,
        tickets::list_tickets,
        tickets::get_ticket,
        tickets::revoke_ticket,
        tickets::get_ticket_qr,
        // Dashboard
        dashboard::get_dashboard,
        // Backup
        backup::export_backup,
        backup::restore_backup,
    ),
    components(
        schemas(
            // Users and auth
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::Role,
            crate::models::user::UserStatus,
            crate::models::user::Rights,
            crate::models::user::UserRights,
            crate::models::user::CreateUser,
            crate::models::user::CreatedUser,
            crate::models::user::UpdateUser,
            crate::models::user::UpdateProfile,
            crate::models::user::SetRole,
            crate::models::user::LoginRequest,
            crate::models::user::LoginResponse,
            crate::models::user::ConfirmPasswordRequest,
            crate::models::user::ConfirmPasswordResponse,
            // Catalog
            crate::models::author::Author,
            crate::models::author::BookAuthor,
            crate::models::author::CreateAuthor,
            crate::models::author::UpdateAuthor,
            crate::models::category::Category,
            crate::models::category::CreateCategory,
            crate::models::category::UpdateCategory,
            crate::models::book::Book,
            crate::models::book::BookShort,
            crate::models::book::BookDetails,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::copy::BookCopy,
            crate::models::copy::CopyStatus,
            crate::models::copy::CreateCopy,
            crate::models::copy::UpdateCopy,
            crate::models::copy::CopyLabel,
            crate::models::copy::CopyQr,
            // Loans
            crate::models::loan::LoanDetails,
            crate::models::loan::CreateLoan,
            crate::models::loan::ReturnByBarcode,
            crate::models::loan::OverdueReport,
            // Equipment
            crate::models::equipment::Equipment,
            crate::models::equipment::EquipmentKind,
            crate::models::equipment::EquipmentStatus,
            crate::models::equipment::CreateEquipment,
            crate::models::equipment::UpdateEquipment,
            crate::models::equipment::EquipmentLoan,
            crate::models::equipment::CheckoutEquipment,
            // Attendance
            crate::models::attendance::AttendanceRecord,
            crate::models::attendance::AttendanceSource,
            crate::models::attendance::AttendanceRequest,
            crate::models::attendance::AttendanceSummary,
            crate::models::attendance::AttendanceAction,
            crate::models::attendance::AttendanceEvent,
            // Tickets
            crate::models::ticket::Ticket,
            crate::models::ticket::TicketPurpose,
            crate::models::ticket::TicketStatus,
            crate::models::ticket::TicketState,
            crate::models::ticket::TicketView,
            crate::models::ticket::IssueTicket,
            crate::models::ticket::IssuedTicket,
            crate::models::ticket::ScanTicket,
            crate::models::ticket::TicketPreview,
            crate::models::ticket::RedeemItem,
            crate::models::ticket::RedeemOutcome,
            tickets::TicketQrData,
            // Dashboard
            crate::models::dashboard::Dashboard,
            crate::models::dashboard::AdminDashboard,
            crate::models::dashboard::LibrarianDashboard,
            crate::models::dashboard::StudentDashboard,
            crate::models::dashboard::ScannerDashboard,
            crate::models::dashboard::RoleCount,
            crate::models::dashboard::EquipmentStatusCount,
            crate::models::dashboard::CatalogTotals,
            crate::models::dashboard::LoanTotals,
            crate::models::dashboard::TicketTotals,
            // Backup
            crate::models::backup::BackupSnapshot,
            crate::models::backup::RestoreReport,
            // Pagination
            crate::models::PaginatedBooks,
            crate::models::PaginatedUsers,
            crate::models::PaginatedLoans,
            crate::models::PaginatedAttendance,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication and password confirmation"),
        (name = "users", description = "User management"),
        (name = "catalog", description = "Authors and categories"),
        (name = "books", description = "Books and copies"),
        (name = "loans", description = "Book loans"),
        (name = "equipment", description = "Equipment lending"),
        (name = "attendance", description = "Library visits"),
        (name = "tickets", description = "QR checkout tickets"),
        (name = "dashboard", description = "Role dashboards"),
        (name = "backup", description = "Export and restore")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_ticket_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/tickets/redeem"));
        assert!(doc.paths.paths.contains_key("/tickets/{id}/qr"));
        assert!(doc.paths.paths.contains_key("/backup/restore"));
    }

    #[test]
    fn test_openapi_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
