//! Repository layer for database operations

pub mod attendance;
pub mod authors;
pub mod backup;
pub mod books;
pub mod categories;
pub mod copies;
pub mod equipment;
pub mod loans;
pub mod stats;
pub mod tickets;
pub mod users;

use sqlx::{Pool, Postgres};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub users: users::UsersRepository,
    pub authors: authors::AuthorsRepository,
    pub categories: categories::CategoriesRepository,
    pub books: books::BooksRepository,
    pub copies: copies::CopiesRepository,
    pub loans: loans::LoansRepository,
    pub equipment: equipment::EquipmentRepository,
    pub attendance: attendance::AttendanceRepository,
    pub tickets: tickets::TicketsRepository,
    pub stats: stats::StatsRepository,
    pub backup: backup::BackupRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            users: users::UsersRepository::new(pool.clone()),
            authors: authors::AuthorsRepository::new(pool.clone()),
            categories: categories::CategoriesRepository::new(pool.clone()),
            books: books::BooksRepository::new(pool.clone()),
            copies: copies::CopiesRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            equipment: equipment::EquipmentRepository::new(pool.clone()),
            attendance: attendance::AttendanceRepository::new(pool.clone()),
            tickets: tickets::TicketsRepository::new(pool.clone()),
            stats: stats::StatsRepository::new(pool.clone()),
            backup: backup::BackupRepository::new(pool.clone()),
            pool,
        }
    }

    /// Database round trip for readiness checks
    pub async fn ping(&self) -> crate::error::AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Map a unique-constraint violation to a conflict error
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> crate::error::AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            crate::error::AppError::Conflict(message.to_string())
        }
        _ => crate::error::AppError::Database(err),
    }
}
