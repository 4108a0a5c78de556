//! Author model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Author record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Author {
    pub id: i32,
    pub lastname: String,
    pub firstname: Option<String>,
    pub bio: Option<String>,
    pub nationality: Option<String>,
    pub crea_date: DateTime<Utc>,
    pub modif_date: Option<DateTime<Utc>>,
    /// Number of books linked to this author
    #[sqlx(default)]
    #[serde(default)]
    pub nb_books: Option<i64>,
}

impl Author {
    pub fn display_name(&self) -> String {
        match &self.firstname {
            Some(first) => format!("{} {}", first, self.lastname),
            None => self.lastname.clone(),
        }
    }
}

/// Author as listed on a book, in credit order
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookAuthor {
    pub id: i32,
    pub lastname: String,
    pub firstname: Option<String>,
    pub position: i16,
}

/// Author query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct AuthorQuery {
    /// Search in first and last names
    pub q: Option<String>,
}

/// Create author request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAuthor {
    #[validate(length(min = 1, max = 200, message = "Last name is required"))]
    pub lastname: String,
    pub firstname: Option<String>,
    pub bio: Option<String>,
    pub nationality: Option<String>,
}

/// Update author request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateAuthor {
    #[validate(length(min = 1, max = 200, message = "Last name cannot be empty"))]
    pub lastname: Option<String>,
    pub firstname: Option<String>,
    pub bio: Option<String>,
    pub nationality: Option<String>,
}
