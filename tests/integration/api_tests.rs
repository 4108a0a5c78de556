//! API integration tests against a running server
//!
//! Needs a server on localhost:8080 with a bootstrap admin `admin` / `admin-password`
//! (CAMPUSLIB_AUTH__BOOTSTRAP_ADMIN_PASSWORD). Run with: cargo test -- --ignored

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";
const ADMIN_LOGIN: &str = "admin";
const ADMIN_PASSWORD: &str = "admin-password";

/// Helper to get an authenticated client
async fn get_auth_token(client: &Client) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "login": ADMIN_LOGIN,
            "password": ADMIN_PASSWORD
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

fn unique(prefix: &str) -> String {
    format!("{}{}", prefix, uuid::Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_and_readiness() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "login": ADMIN_LOGIN, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["role"], "admin");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "login": unique("nobody"), "password": "wrong-password" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_borrow_ticket_flow() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    // Catalog: one book with one copy
    let book: Value = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "title": unique("Ticket flow ") }))
        .send()
        .await
        .expect("Failed to create book")
        .json()
        .await
        .expect("Failed to parse book");
    let book_id = book["id"].as_i64().expect("No book id");

    let copy: Value = client
        .post(format!("{}/books/{}/copies", BASE_URL, book_id))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to create copy")
        .json()
        .await
        .expect("Failed to parse copy");
    let copy_id = copy["id"].as_i64().expect("No copy id");

    // Student receives a generated password
    let created: Value = client
        .post(format!("{}/users", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "login": unique("student"), "role": "student" }))
        .send()
        .await
        .expect("Failed to create user")
        .json()
        .await
        .expect("Failed to parse user");
    let student_id = created["user"]["id"].as_i64().expect("No user id");
    assert!(created["temporary_password"].is_string());

    // Staff issue a borrow ticket for the student
    let response = client
        .post(format!("{}/tickets", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "purpose": "borrow", "copy_ids": [copy_id], "user_id": student_id }))
        .send()
        .await
        .expect("Failed to issue ticket");
    assert_eq!(response.status(), StatusCode::CREATED);
    let issued: Value = response.json().await.expect("Failed to parse ticket");
    let ticket_token = issued["token"].as_str().expect("No ticket token").to_string();

    let response = client
        .post(format!("{}/tickets/verify", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "token": ticket_token }))
        .send()
        .await
        .expect("Failed to verify ticket");
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(format!("{}/tickets/redeem", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "token": ticket_token }))
        .send()
        .await
        .expect("Failed to redeem ticket");
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = response.json().await.expect("Failed to parse outcome");
    assert_eq!(outcome["items"][0]["ok"], true);
    assert_eq!(outcome["ticket"]["state"], "redeemed");

    // Single use
    let response = client
        .post(format!("{}/tickets/redeem", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "token": ticket_token }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The copy is now on loan
    let response = client
        .post(format!("{}/loans/return-by-barcode", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "barcode": copy["barcode"] }))
        .send()
        .await
        .expect("Failed to return copy");
    assert_eq!(response.status(), StatusCode::OK);
    let loan: Value = response.json().await.expect("Failed to parse loan");
    assert!(loan["returned_date"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_delete_requires_password_confirmation() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let category: Value = client
        .post(format!("{}/categories", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "name": unique("Category ") }))
        .send()
        .await
        .expect("Failed to create category")
        .json()
        .await
        .expect("Failed to parse category");
    let id = category["id"].as_i64().expect("No category id");

    let response = client
        .delete(format!("{}/categories/{}", BASE_URL, id))
        .bearer_auth(&token)
        .header("X-Confirm-Password", "wrong-password")
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .delete(format!("{}/categories/{}", BASE_URL, id))
        .bearer_auth(&token)
        .header("X-Confirm-Password", ADMIN_PASSWORD)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
#[ignore]
async fn test_backup_export() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let response = client
        .get(format!("{}/backup/export", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse snapshot");
    assert_eq!(body["format_version"], 1);
    assert!(body["tables"]["users"].is_array());
    assert_eq!(body["checksum"].as_str().map(str::len), Some(64));
}
