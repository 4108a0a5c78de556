//! Service and router tests backed by a real PostgreSQL database
//!
//! Each test gets a fresh database with the migrations applied (`DATABASE_URL`
//! must point at a server the test user can create databases on). Redis is
//! never reached: tokens are minted directly and no path here confirms a password.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

use campuslib_server::{
    api,
    config::AppConfig,
    error::AppError,
    models::{
        book::{BookQuery, CreateBook},
        copy::{BookCopy, CreateCopy},
        equipment::{CheckoutEquipment, CreateEquipment, EquipmentKind, EquipmentStatus, UpdateEquipment},
        loan::CreateLoan,
        ticket::{IssueTicket, IssuedTicket, TicketPurpose, TicketQuery, TicketState},
        user::CreateUser,
        Role, UserClaims,
    },
    qr::{QrRenderer, RemoteQrRenderer},
    repository::Repository,
    services::{redis::RedisService, Services},
    AppState,
};

fn services(pool: PgPool) -> (Services, AppConfig) {
    let config = AppConfig::default();
    let redis = RedisService::new("redis://127.0.0.1:1").unwrap();
    let qr: Arc<dyn QrRenderer> = Arc::new(RemoteQrRenderer::from_config(&config.tickets).unwrap());
    (Services::new(Repository::new(pool), &config, redis, qr), config)
}

fn app(pool: PgPool) -> (Router, AppConfig) {
    let (services, config) = services(pool);
    let state = AppState {
        config: Arc::new(config.clone()),
        services: Arc::new(services),
    };
    (api::router(state), config)
}

fn claims(user_id: i32, role: Role) -> UserClaims {
    let now = Utc::now().timestamp();
    UserClaims {
        sub: format!("user{}", user_id),
        user_id,
        role,
        exp: now + 3600,
        iat: now,
    }
}

fn bearer(config: &AppConfig, user_id: i32, role: Role) -> String {
    format!("Bearer {}", claims(user_id, role).create_token(&config.auth.jwt_secret).unwrap())
}

/// Admin created straight through the repository, as the bootstrap does
async fn seed_admin(pool: &PgPool) -> UserClaims {
    let admin = Repository::new(pool.clone())
        .users
        .create(&new_user("root-admin", Role::Admin), "unused-hash", Role::Admin)
        .await
        .unwrap();
    claims(admin.id, Role::Admin)
}

fn new_user(login: &str, role: Role) -> CreateUser {
    CreateUser {
        login: login.to_string(),
        password: Some("correct-horse-battery".to_string()),
        firstname: None,
        lastname: Some(login.to_string()),
        email: None,
        student_number: None,
        department: None,
        phone: None,
        language: None,
        role: Some(role),
    }
}

async fn create_student(services: &Services, admin: &UserClaims, login: &str) -> UserClaims {
    let created = services.users.create(admin, new_user(login, Role::Student)).await.unwrap();
    claims(created.user.id, Role::Student)
}

async fn create_copy(services: &Services, title: &str, isbn: Option<&str>) -> BookCopy {
    let book = services
        .catalog
        .create_book(CreateBook {
            title: title.to_string(),
            subtitle: None,
            isbn: isbn.map(str::to_string),
            publisher: None,
            publication_year: None,
            language: None,
            description: None,
            category_id: None,
            author_ids: vec![],
        })
        .await
        .unwrap();
    services.catalog.create_copy(book.book.id, CreateCopy::default()).await.unwrap()
}

fn issue_request(purpose: TicketPurpose, copy_ids: Vec<i32>, user_id: Option<i32>) -> IssueTicket {
    IssueTicket {
        purpose,
        copy_ids,
        barcodes: vec![],
        equipment_id: None,
        user_id,
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn test_concurrent_redeem_has_single_winner(pool: PgPool) {
    let (services, _) = services(pool.clone());
    let admin = seed_admin(&pool).await;
    let student = create_student(&services, &admin, "race-student").await;
    let copy = create_copy(&services, "Concurrency in Practice", None).await;

    let issued: IssuedTicket = services
        .tickets
        .issue(&admin, issue_request(TicketPurpose::Borrow, vec![copy.id], Some(student.user_id)))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        services.tickets.redeem(&admin, &issued.token),
        services.tickets.redeem(&admin, &issued.token),
    );

    let winners = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);

    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser, Err(AppError::TicketInvalid(_))));

    let loans = services.loans.user_loans(student.user_id).await.unwrap();
    assert_eq!(loans.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_second_return_is_refused(pool: PgPool) {
    let (services, _) = services(pool.clone());
    let admin = seed_admin(&pool).await;
    let student = create_student(&services, &admin, "return-student").await;
    let copy = create_copy(&services, "Returned Twice", None).await;

    let loan = services
        .loans
        .create_loan(CreateLoan {
            user_id: student.user_id,
            copy_id: Some(copy.id),
            barcode: None,
            force: false,
        })
        .await
        .unwrap();

    let returned = services.loans.return_loan(loan.id).await.unwrap();
    assert!(returned.returned_date.is_some());

    let again = services.loans.return_loan(loan.id).await;
    assert!(matches!(again, Err(AppError::BusinessRule(_))));

    let by_barcode = services.loans.return_by_barcode(&copy.barcode).await;
    assert!(matches!(by_barcode, Err(AppError::BusinessRule(_))));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_expired_ticket_is_gone(pool: PgPool) {
    let (app, config) = app(pool.clone());
    let (services, _) = services(pool.clone());
    let admin = seed_admin(&pool).await;
    let student = create_student(&services, &admin, "late-student").await;

    let issued = services
        .tickets
        .issue(&student, issue_request(TicketPurpose::Attendance, vec![], None))
        .await
        .unwrap();

    sqlx::query("UPDATE tickets SET expires_at = NOW() - INTERVAL '1 minute' WHERE id = $1")
        .bind(issued.ticket.ticket.id)
        .execute(&pool)
        .await
        .unwrap();

    assert!(matches!(
        services.tickets.redeem(&admin, &issued.token).await,
        Err(AppError::TicketExpired)
    ));

    let response = app
        .oneshot(
            Request::post("/api/v1/tickets/verify")
                .header(header::AUTHORIZATION, bearer(&config, admin.user_id, Role::Admin))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "token": issued.token }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);

    // Listed as expired, no longer as issued
    let expired = services
        .tickets
        .list(&TicketQuery { user_id: Some(student.user_id), status: Some(TicketState::Expired) })
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].state, TicketState::Expired);

    let issued_only = services
        .tickets
        .list_mine(&student, Some(TicketState::Issued))
        .await
        .unwrap();
    assert!(issued_only.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_revoked_ticket_cannot_be_redeemed(pool: PgPool) {
    let (services, _) = services(pool.clone());
    let admin = seed_admin(&pool).await;
    let student = create_student(&services, &admin, "revoke-student").await;

    let issued = services
        .tickets
        .issue(&student, issue_request(TicketPurpose::Attendance, vec![], None))
        .await
        .unwrap();

    let revoked = services.tickets.revoke(&student, issued.ticket.ticket.id).await.unwrap();
    assert_eq!(revoked.state, TicketState::Revoked);

    assert!(matches!(
        services.tickets.redeem(&admin, &issued.token).await,
        Err(AppError::TicketInvalid(_))
    ));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_attendance_failure_is_reported_per_item(pool: PgPool) {
    let (services, _) = services(pool.clone());
    let admin = seed_admin(&pool).await;
    let student = create_student(&services, &admin, "blocked-visitor").await;

    let issued = services
        .tickets
        .issue(&student, issue_request(TicketPurpose::Attendance, vec![], None))
        .await
        .unwrap();

    sqlx::query("UPDATE users SET status = 'blocked' WHERE id = $1")
        .bind(student.user_id)
        .execute(&pool)
        .await
        .unwrap();

    let outcome = services.tickets.redeem(&admin, &issued.token).await.unwrap();
    assert_eq!(outcome.ticket.state, TicketState::Redeemed);
    assert!(outcome.attendance.is_none());
    assert_eq!(outcome.items.len(), 1);
    assert!(!outcome.items[0].ok);
    assert!(outcome.items[0].error.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_equipment_status_machine_under_checkout(pool: PgPool) {
    let (services, _) = services(pool.clone());
    let admin = seed_admin(&pool).await;
    let student = create_student(&services, &admin, "laptop-student").await;

    let laptop = services
        .equipment
        .create(CreateEquipment {
            name: "Loaner laptop".to_string(),
            kind: Some(EquipmentKind::Laptop),
            serial_number: Some("LT-0001".to_string()),
            location: None,
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(laptop.status, EquipmentStatus::Available);

    services
        .equipment
        .checkout(laptop.id, CheckoutEquipment { user_id: student.user_id, due_date: None })
        .await
        .unwrap();
    assert_eq!(services.equipment.get(laptop.id).await.unwrap().status, EquipmentStatus::InUse);

    // Checked out equipment is neither lent twice nor moved to maintenance
    let again = services
        .equipment
        .checkout(laptop.id, CheckoutEquipment { user_id: student.user_id, due_date: None })
        .await;
    assert!(matches!(again, Err(AppError::BusinessRule(_))));

    let to_maintenance = UpdateEquipment { status: Some(EquipmentStatus::Maintenance), ..Default::default() };
    assert!(matches!(
        services.equipment.update(laptop.id, to_maintenance).await,
        Err(AppError::BusinessRule(_))
    ));

    // Retiring closes the open checkout
    let to_retired = UpdateEquipment { status: Some(EquipmentStatus::Retired), ..Default::default() };
    let retired = services.equipment.update(laptop.id, to_retired).await.unwrap();
    assert_eq!(retired.status, EquipmentStatus::Retired);

    let history = services.equipment.loans_history(laptop.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].returned_date.is_some());

    let reactivate = UpdateEquipment { status: Some(EquipmentStatus::Available), ..Default::default() };
    assert!(services.equipment.update(laptop.id, reactivate).await.is_err());
    assert!(services.equipment.return_equipment(laptop.id).await.is_err());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_backup_restore_round_trip(pool: PgPool) {
    let (services, _) = services(pool.clone());
    let admin = seed_admin(&pool).await;
    let student = create_student(&services, &admin, "backup-student").await;
    let copy = create_copy(&services, "Snapshot Book", None).await;
    services
        .loans
        .create_loan(CreateLoan { user_id: student.user_id, copy_id: Some(copy.id), barcode: None, force: false })
        .await
        .unwrap();

    let snapshot = services.backup.export().await.unwrap();
    assert_eq!(snapshot.row_count("loans"), 1);

    // Changes made after the export disappear on restore
    create_copy(&services, "Written After Export", None).await;

    let report = services.backup.restore(snapshot.clone(), admin.user_id).await.unwrap();
    assert_eq!(report.restored["books"], 1);
    assert_eq!(report.restored["loans"], 1);

    let books = services.catalog.search_books(&BookQuery::default()).await.unwrap();
    assert_eq!(books.total, 1);

    // Sequences continue after the restored ids
    let next = create_copy(&services, "After Restore", None).await;
    assert!(next.book_id > copy.book_id);

    let again = services.backup.export().await.unwrap();
    assert_eq!(again.row_count("users"), snapshot.row_count("users"));

    // A tampered snapshot is refused before anything is touched
    let mut tampered = snapshot;
    tampered.checksum = "0".repeat(64);
    assert!(matches!(
        services.backup.restore(tampered, admin.user_id).await,
        Err(AppError::Validation(_))
    ));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_hyphenated_isbn_finds_book(pool: PgPool) {
    let (services, _) = services(pool);
    create_copy(&services, "Numerical Recipes", Some("978-0-306-40615-7")).await;

    let query = BookQuery {
        q: Some("978-0-306-40615-7".to_string()),
        ..Default::default()
    };
    let found = services.catalog.search_books(&query).await.unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.items[0].title, "Numerical Recipes");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_student_cannot_redeem_tickets(pool: PgPool) {
    let (app, config) = app(pool.clone());
    let (services, _) = services(pool.clone());
    let admin = seed_admin(&pool).await;
    let student = create_student(&services, &admin, "eager-student").await;

    let response = app
        .oneshot(
            Request::post("/api/v1/tickets/redeem")
                .header(header::AUTHORIZATION, bearer(&config, student.user_id, Role::Student))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "token": "anything" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_create_user_validation(pool: PgPool) {
    let (app, config) = app(pool.clone());
    let admin = seed_admin(&pool).await;

    let response = app
        .oneshot(
            Request::post("/api/v1/users")
                .header(header::AUTHORIZATION, bearer(&config, admin.user_id, Role::Admin))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "login": "ab", "email": "nope" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], 6);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_blocked_or_reroled_token_cannot_write(pool: PgPool) {
    let (services, config) = services(pool.clone());
    let admin = seed_admin(&pool).await;
    let student = create_student(&services, &admin, "stale-token").await;
    let ticket_body = json!({ "purpose": "attendance" }).to_string();

    let (router, _) = app(pool.clone());
    let response = router
        .oneshot(
            Request::post("/api/v1/tickets")
                .header(header::AUTHORIZATION, bearer(&config, student.user_id, Role::Student))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(ticket_body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Role changed since the token was signed
    services.users.set_role(&admin, student.user_id, Role::Scanner).await.unwrap();
    let (router, _) = app(pool.clone());
    let response = router
        .oneshot(
            Request::post("/api/v1/tickets")
                .header(header::AUTHORIZATION, bearer(&config, student.user_id, Role::Student))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(ticket_body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Blocked account, token with the current role
    sqlx::query("UPDATE users SET status = 'blocked' WHERE id = $1")
        .bind(student.user_id)
        .execute(&pool)
        .await
        .unwrap();
    let (router, _) = app(pool);
    let response = router
        .oneshot(
            Request::post("/api/v1/tickets")
                .header(header::AUTHORIZATION, bearer(&config, student.user_id, Role::Scanner))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(ticket_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
