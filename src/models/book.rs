//! Book (catalog title) model and ISBN handling

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::author::BookAuthor;
use super::category::Category;

static ISBN_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{9}[\dX]|97[89]\d{10})$").expect("valid ISBN regex"));

/// Normalize an ISBN-10 or ISBN-13 (hyphens and spaces ignored) and verify its checksum
pub fn normalize_isbn(raw: &str) -> Result<String, String> {
    let isbn: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if !ISBN_SHAPE.is_match(&isbn) {
        return Err(format!("Invalid ISBN: {}", raw));
    }

    let valid = if isbn.len() == 10 {
        let sum: u32 = isbn
            .chars()
            .enumerate()
            .map(|(i, c)| {
                let value = if c == 'X' { 10 } else { c.to_digit(10).unwrap_or(0) };
                value * (10 - i as u32)
            })
            .sum();
        sum % 11 == 0
    } else {
        let sum: u32 = isbn
            .chars()
            .filter_map(|c| c.to_digit(10))
            .enumerate()
            .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
            .sum();
        sum % 10 == 0
    };

    if valid {
        Ok(isbn)
    } else {
        Err(format!("Invalid ISBN checksum: {}", raw))
    }
}

/// Book record from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub isbn: Option<String>,
    pub title: String,
    pub subtitle: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    pub crea_date: DateTime<Utc>,
    pub modif_date: Option<DateTime<Utc>>,
}

/// Short book representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub isbn: Option<String>,
    pub title: String,
    pub publication_year: Option<i32>,
    pub category_id: Option<i32>,
    pub category_name: Option<String>,
    /// Authors joined in credit order
    pub authors: Option<String>,
    pub nb_copies: i64,
    pub nb_available: i64,
}

/// Book with authors, category and copy availability
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub authors: Vec<BookAuthor>,
    pub category: Option<Category>,
    pub nb_copies: i64,
    pub nb_available: i64,
}

/// Book query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Search in title, subtitle, ISBN and author names
    pub q: Option<String>,
    pub category_id: Option<i32>,
    pub author_id: Option<i32>,
    /// Only books with at least one available copy
    pub available: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    /// `LIKE` pattern for `q`; a term that reads as an ISBN is matched in its stored form
    pub fn search_pattern(&self) -> Option<String> {
        let term = self.q.as_deref()?;
        match normalize_isbn(term) {
            Ok(isbn) => crate::search::like_pattern(&isbn),
            Err(_) => crate::search::like_pattern(term),
        }
    }
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 500, message = "Title is required"))]
    pub title: String,
    pub subtitle: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, max = 2100, message = "Invalid publication year"))]
    pub publication_year: Option<i32>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    /// Author ids in credit order
    #[serde(default)]
    pub author_ids: Vec<i32>,
}

/// Update book request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 500, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, max = 2100, message = "Invalid publication year"))]
    pub publication_year: Option<i32>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i32>,
    /// Replaces the author list when present
    pub author_ids: Option<Vec<i32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyphenated_isbn_query_matches_stored_form() {
        let query = BookQuery {
            q: Some("978-0-306-40615-7".to_string()),
            ..Default::default()
        };
        assert_eq!(query.search_pattern(), Some("%9780306406157%".to_string()));

        let query = BookQuery {
            q: Some("Misérables".to_string()),
            ..Default::default()
        };
        assert_eq!(query.search_pattern(), Some("%miserables%".to_string()));
        assert_eq!(BookQuery::default().search_pattern(), None);
    }

    #[test]
    fn test_normalize_isbn13() {
        assert_eq!(
            normalize_isbn("978-2-07-040850-4").unwrap(),
            "9782070408504"
        );
        assert_eq!(normalize_isbn("978 0 306 40615 7").unwrap(), "9780306406157");
    }

    #[test]
    fn test_normalize_isbn10_with_x() {
        assert_eq!(normalize_isbn("0-8044-2957-x").unwrap(), "080442957X");
        assert_eq!(normalize_isbn("2070408507").unwrap(), "2070408507");
    }

    #[test]
    fn test_rejects_bad_checksum() {
        assert!(normalize_isbn("978-2-07-040850-5").is_err());
        assert!(normalize_isbn("2070408508").is_err());
    }

    #[test]
    fn test_rejects_bad_shape() {
        assert!(normalize_isbn("").is_err());
        assert!(normalize_isbn("12345").is_err());
        assert!(normalize_isbn("X070408507").is_err());
        assert!(normalize_isbn("1234567890123").is_err());
    }
}
