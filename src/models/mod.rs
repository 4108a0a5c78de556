//! Data models for Campuslib

/// Lowercase slug conversions for enums stored in TEXT columns
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $slug:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $slug),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($slug => Ok($ty::$variant),)+
                    other => Err(format!("Invalid {}: {}", stringify!($ty), other)),
                }
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

pub mod attendance;
pub mod author;
pub mod backup;
pub mod book;
pub mod category;
pub mod copy;
pub mod dashboard;
pub mod equipment;
pub mod loan;
pub mod ticket;
pub mod user;

// Re-export commonly used types
pub use author::Author;
pub use book::{Book, BookDetails, BookShort};
pub use category::Category;
pub use copy::BookCopy;
pub use equipment::Equipment;
pub use loan::{Loan, LoanDetails};
pub use ticket::Ticket;
pub use user::{Role, User, UserClaims, UserShort};

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Pagination query parameters shared by list endpoints
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Items per page (default: 20, max: 200)
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 200)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}

/// Paginated response wrapper
#[derive(Serialize, ToSchema)]
#[aliases(
    PaginatedBooks = Paginated<BookShort>,
    PaginatedUsers = Paginated<UserShort>,
    PaginatedLoans = Paginated<LoanDetails>,
    PaginatedAttendance = Paginated<attendance::AttendanceRecord>
)]
pub struct Paginated<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// Page content
    pub items: Vec<T>,
    /// Total number of matching rows
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

impl<T> Paginated<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page(),
            per_page: pagination.per_page(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        let p = Pagination { page: Some(0), per_page: Some(1000) };
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), 200);
        assert_eq!(p.offset(), 0);

        let p = Pagination { page: Some(3), per_page: Some(25) };
        assert_eq!(p.offset(), 50);

        let p = Pagination::default();
        assert_eq!(p.per_page(), 20);
    }
}
