//! Users repository for database operations

use chrono::Utc;
use sqlx::{Pool, Postgres};

use super::conflict_on_unique;
use crate::{
    error::{AppError, AppResult},
    models::user::{CreateUser, Role, UpdateProfile, UpdateUser, User, UserQuery, UserShort, UserStatus},
    search,
};

const USER_SHORT_SELECT: &str = r#"
    SELECT u.id, u.login, u.firstname, u.lastname, u.student_number, u.role, u.status,
           (SELECT COUNT(*) FROM loans l
             WHERE l.user_id = u.id AND l.returned_date IS NULL) AS nb_loans,
           (SELECT COUNT(*) FROM loans l
             WHERE l.user_id = u.id AND l.returned_date IS NULL AND l.due_date < NOW()) AS nb_late_loans
    FROM users u
"#;

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by login (case-insensitive), ignoring deleted accounts
    pub async fn get_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(login) = LOWER($1) AND status != 'deleted'",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Short representation with loan counters
    pub async fn get_short(&self, id: i32) -> AppResult<UserShort> {
        sqlx::query_as::<_, UserShort>(&format!("{} WHERE u.id = $1", USER_SHORT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Check if login already exists
    pub async fn login_exists(&self, login: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(login) = LOWER($1) AND ($2::int IS NULL OR id != $2))",
        )
        .bind(login)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Check if a student number is already assigned
    pub async fn student_number_exists(&self, number: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE student_number = $1 AND ($2::int IS NULL OR id != $2))",
        )
        .bind(number)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Search users with pagination
    pub async fn search(&self, query: &UserQuery, limit: i64, offset: i64) -> AppResult<(Vec<UserShort>, i64)> {
        let pattern = query.q.as_deref().and_then(search::like_pattern);

        let mut conditions = Vec::new();
        let mut idx = 1;

        if pattern.is_some() {
            conditions.push(format!("u.search_key LIKE ${}", idx));
            idx += 1;
        }
        if query.role.is_some() {
            conditions.push(format!("u.role = ${}", idx));
            idx += 1;
        }
        if query.status.is_some() {
            conditions.push(format!("u.status = ${}", idx));
        } else {
            conditions.push("u.status != 'deleted'".to_string());
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        let count_query = format!("SELECT COUNT(*) FROM users u {}", where_clause);
        let select_query = format!(
            "{} {} ORDER BY u.lastname NULLS LAST, u.firstname, u.login LIMIT {} OFFSET {}",
            USER_SHORT_SELECT, where_clause, limit, offset
        );

        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        let mut builder = sqlx::query_as::<_, UserShort>(&select_query);

        macro_rules! bind_both {
            ($value:expr) => {
                count_builder = count_builder.bind($value);
                builder = builder.bind($value);
            };
        }

        if let Some(ref p) = pattern {
            bind_both!(p);
        }
        if let Some(role) = query.role {
            bind_both!(role);
        }
        if let Some(status) = query.status {
            bind_both!(status);
        }

        let total = count_builder.fetch_one(&self.pool).await?;
        let users = builder.fetch_all(&self.pool).await?;

        Ok((users, total))
    }

    /// Create a new user with an already hashed password
    pub async fn create(&self, data: &CreateUser, password_hash: &str, role: Role) -> AppResult<User> {
        let key = search::search_key([
            data.firstname.as_deref(),
            data.lastname.as_deref(),
            Some(data.login.as_str()),
            data.email.as_deref(),
            data.student_number.as_deref(),
        ]);

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (login, password, firstname, lastname, email, student_number,
                               department, phone, language, role, status, search_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'active', $11)
            RETURNING *
            "#,
        )
        .bind(data.login.trim())
        .bind(password_hash)
        .bind(&data.firstname)
        .bind(&data.lastname)
        .bind(&data.email)
        .bind(&data.student_number)
        .bind(&data.department)
        .bind(&data.phone)
        .bind(&data.language)
        .bind(role)
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Login or student number already exists"))
    }

    /// Update an existing user
    pub async fn update(&self, id: i32, data: &UpdateUser, password_hash: Option<String>) -> AppResult<User> {
        let mut sets = vec!["modif_date = $1".to_string()];
        let mut idx = 2;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, idx));
                    idx += 1;
                }
            };
        }

        add_field!(data.login, "login");
        add_field!(password_hash, "password");
        add_field!(data.firstname, "firstname");
        add_field!(data.lastname, "lastname");
        add_field!(data.email, "email");
        add_field!(data.student_number, "student_number");
        add_field!(data.department, "department");
        add_field!(data.phone, "phone");
        add_field!(data.language, "language");
        add_field!(data.status, "status");

        let query = format!("UPDATE users SET {} WHERE id = ${} RETURNING *", sets.join(", "), idx);

        let mut builder = sqlx::query_as::<_, User>(&query).bind(Utc::now());

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(data.login);
        bind_field!(password_hash);
        bind_field!(data.firstname);
        bind_field!(data.lastname);
        bind_field!(data.email);
        bind_field!(data.student_number);
        bind_field!(data.department);
        bind_field!(data.phone);
        bind_field!(data.language);
        bind_field!(data.status);

        let user = builder
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "Login or student number already exists"))?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

        self.store_search_key(&user).await?;
        Ok(user)
    }

    /// Update own profile fields
    pub async fn update_profile(&self, id: i32, profile: &UpdateProfile, password_hash: Option<String>) -> AppResult<User> {
        let data = UpdateUser {
            login: profile.login.clone(),
            password: None,
            firstname: profile.firstname.clone(),
            lastname: profile.lastname.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            language: profile.language.clone(),
            ..Default::default()
        };
        self.update(id, &data, password_hash).await
    }

    /// Change a user's role
    pub async fn set_role(&self, id: i32, role: Role) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET role = $1, modif_date = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(role)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Soft delete: the row stays for loan history
    pub async fn mark_deleted(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET status = $1, modif_date = NOW() WHERE id = $2 AND status != $1",
        )
        .bind(UserStatus::Deleted)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        Ok(())
    }

    /// Number of active admin accounts
    pub async fn count_admins(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = 'admin' AND status = 'active'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn store_search_key(&self, user: &User) -> AppResult<()> {
        sqlx::query("UPDATE users SET search_key = $1 WHERE id = $2")
            .bind(user.search_key())
            .bind(user.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
