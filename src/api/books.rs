//! Book and copy endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        book::{BookQuery, CreateBook, UpdateBook},
        copy::{CopyQr, CreateCopy, UpdateCopy},
        BookCopy, BookDetails, PaginatedBooks,
    },
    AppState,
};

use super::{AuthenticatedUser, ConfirmedUser, WriteCatalog};

/// Search the catalog
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = PaginatedBooks),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedBooks>> {
    claims.require_read_catalog()?;

    let books = state.services.catalog.search_books(&query).await?;
    Ok(Json(books))
}

/// Get book with authors, category and copies
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = BookDetails),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookDetails>> {
    claims.require_read_catalog()?;

    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Create a book
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = BookDetails),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Unknown author or category"),
        (status = 409, description = "ISBN already catalogued")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<BookDetails>)> {
    claims.require_write_catalog()?;
    data.validate()?;

    let book = state.services.catalog.create_book(data).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = BookDetails),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(data): Json<UpdateBook>,
) -> AppResult<Json<BookDetails>> {
    claims.require_write_catalog()?;
    data.validate()?;

    let book = state.services.catalog.update_book(id, data).await?;
    Ok(Json(book))
}

/// Delete a book and its copies
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID"),
        ("X-Confirm-Password" = String, Header, description = "Caller's password")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 422, description = "Copies are on loan")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    _: ConfirmedUser<WriteCatalog>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List copies of a book
#[utoipa::path(
    get,
    path = "/books/{id}/copies",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Copies with loan state", body = Vec<BookCopy>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn list_copies(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<BookCopy>>> {
    claims.require_read_catalog()?;

    let copies = state.services.catalog.list_copies(book_id).await?;
    Ok(Json(copies))
}

/// Add a copy to a book
#[utoipa::path(
    post,
    path = "/books/{id}/copies",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = CreateCopy,
    responses(
        (status = 201, description = "Copy created", body = BookCopy),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Barcode already used")
    )
)]
pub async fn create_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(data): Json<CreateCopy>,
) -> AppResult<(StatusCode, Json<BookCopy>)> {
    claims.require_write_catalog()?;

    let copy = state.services.catalog.create_copy(book_id, data).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

/// Shelf label QR codes for every copy of a book
#[utoipa::path(
    get,
    path = "/books/{id}/copies/qr",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Label payloads and QR image URLs", body = Vec<CopyQr>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_copies_qr(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<CopyQr>>> {
    claims.require_write_catalog()?;

    let labels = state.services.catalog.get_book_copies_qrs(book_id).await?;
    Ok(Json(labels))
}

/// Get a copy by ID
#[utoipa::path(
    get,
    path = "/copies/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Copy ID")),
    responses(
        (status = 200, description = "Copy", body = BookCopy),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn get_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookCopy>> {
    claims.require_read_catalog()?;

    let copy = state.services.catalog.get_copy(id).await?;
    Ok(Json(copy))
}

/// Look up a copy by barcode
#[utoipa::path(
    get,
    path = "/copies/barcode/{barcode}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("barcode" = String, Path, description = "Copy barcode")),
    responses(
        (status = 200, description = "Copy", body = BookCopy),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn get_copy_by_barcode(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(barcode): Path<String>,
) -> AppResult<Json<BookCopy>> {
    claims.require_read_catalog()?;

    let copy = state.services.catalog.find_copy_by_barcode(&barcode).await?;
    Ok(Json(copy))
}

/// Update a copy
#[utoipa::path(
    put,
    path = "/copies/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Copy ID")),
    request_body = UpdateCopy,
    responses(
        (status = 200, description = "Copy updated", body = BookCopy),
        (status = 404, description = "Copy not found"),
        (status = 409, description = "Barcode already used")
    )
)]
pub async fn update_copy(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(data): Json<UpdateCopy>,
) -> AppResult<Json<BookCopy>> {
    claims.require_write_catalog()?;

    let copy = state.services.catalog.update_copy(id, data).await?;
    Ok(Json(copy))
}

/// Delete a copy that is not on loan
#[utoipa::path(
    delete,
    path = "/copies/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Copy ID"),
        ("X-Confirm-Password" = String, Header, description = "Caller's password")
    ),
    responses(
        (status = 204, description = "Copy deleted"),
        (status = 404, description = "Copy not found"),
        (status = 422, description = "Copy is on loan")
    )
)]
pub async fn delete_copy(
    State(state): State<AppState>,
    _: ConfirmedUser<WriteCatalog>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_copy(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
