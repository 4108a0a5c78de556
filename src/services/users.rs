//! User management service

use rand::{distributions::Alphanumeric, Rng};

use crate::{
    error::{AppError, AppResult},
    models::{
        user::{CreateUser, CreatedUser, Role, UpdateUser, User, UserClaims, UserQuery, UserShort, UserStatus},
        Paginated, Pagination,
    },
    repository::Repository,
    services::{auth::hash_password, email::EmailService},
};

const TEMPORARY_PASSWORD_LENGTH: usize = 12;

fn temporary_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Roles a caller may hand out when creating accounts
fn check_assignable(caller: &UserClaims, role: Role) -> AppResult<()> {
    match (caller.role, role) {
        (Role::Admin, _) => Ok(()),
        (Role::Librarian, Role::Student | Role::Scanner) => Ok(()),
        _ => Err(AppError::Authorization(format!(
            "A {} cannot create {} accounts",
            caller.role, role
        ))),
    }
}

/// Librarians manage students and scanners, and themselves
fn check_manageable(caller: &UserClaims, target: &User) -> AppResult<()> {
    if caller.is_admin() || caller.user_id == target.id || !target.role.is_staff() {
        Ok(())
    } else {
        Err(AppError::Authorization("Only administrators can modify staff accounts".to_string()))
    }
}

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    email: EmailService,
}

impl UsersService {
    pub fn new(repository: Repository, email: EmailService) -> Self {
        Self { repository, email }
    }

    pub async fn list(&self, query: &UserQuery) -> AppResult<Paginated<UserShort>> {
        let pagination = Pagination { page: query.page, per_page: query.per_page };
        let (users, total) = self
            .repository
            .users
            .search(query, pagination.per_page(), pagination.offset())
            .await?;
        Ok(Paginated::new(users, total, &pagination))
    }

    pub async fn get(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn get_short(&self, id: i32) -> AppResult<UserShort> {
        self.repository.users.get_short(id).await
    }

    /// Create an account; a temporary password is generated when none is given
    pub async fn create(&self, caller: &UserClaims, data: CreateUser) -> AppResult<CreatedUser> {
        let role = data.role.unwrap_or(Role::Student);
        check_assignable(caller, role)?;

        if self.repository.users.login_exists(&data.login, None).await? {
            return Err(AppError::Conflict("Login already exists".to_string()));
        }
        if let Some(ref number) = data.student_number {
            if self.repository.users.student_number_exists(number, None).await? {
                return Err(AppError::Conflict("Student number already exists".to_string()));
            }
        }

        let (password, generated) = match data.password.clone() {
            Some(password) => (password, false),
            None => (temporary_password(), true),
        };

        let user = self
            .repository
            .users
            .create(&data, &hash_password(&password)?, role)
            .await?;

        tracing::info!(user_id = user.id, role = %role, created_by = caller.user_id, "User created");

        if !generated {
            return Ok(CreatedUser { user, temporary_password: None });
        }

        if let (true, Some(email)) = (self.email.is_enabled(), user.email.as_deref()) {
            if let Err(e) = self
                .email
                .send_welcome(email, &user.display_name(), &user.login, &password)
                .await
            {
                tracing::warn!(user_id = user.id, "Welcome email not sent: {}", e);
            }
        }

        Ok(CreatedUser { user, temporary_password: Some(password) })
    }

    pub async fn update(&self, caller: &UserClaims, id: i32, data: UpdateUser) -> AppResult<User> {
        let target = self.repository.users.get_by_id(id).await?;
        check_manageable(caller, &target)?;

        if data.status == Some(UserStatus::Deleted) {
            return Err(AppError::Validation("Use DELETE to remove a user".to_string()));
        }
        if caller.user_id == id && data.status == Some(UserStatus::Blocked) {
            return Err(AppError::BusinessRule("You cannot block your own account".to_string()));
        }

        if let Some(ref login) = data.login {
            if self.repository.users.login_exists(login, Some(id)).await? {
                return Err(AppError::Conflict("Login already exists".to_string()));
            }
        }
        if let Some(ref number) = data.student_number {
            if self.repository.users.student_number_exists(number, Some(id)).await? {
                return Err(AppError::Conflict("Student number already exists".to_string()));
            }
        }

        let password_hash = data.password.as_deref().map(hash_password).transpose()?;
        self.repository.users.update(id, &data, password_hash).await
    }

    /// Admin only; an admin cannot demote themselves
    pub async fn set_role(&self, caller: &UserClaims, id: i32, role: Role) -> AppResult<User> {
        caller.require_admin()?;
        if caller.user_id == id && role != Role::Admin {
            return Err(AppError::BusinessRule("You cannot remove your own admin role".to_string()));
        }

        let user = self.repository.users.set_role(id, role).await?;
        tracing::info!(user_id = id, role = %role, changed_by = caller.user_id, "User role changed");
        Ok(user)
    }

    /// Soft delete; open loans block deletion unless forced
    pub async fn delete(&self, caller: &UserClaims, id: i32, force: bool) -> AppResult<()> {
        if caller.user_id == id {
            return Err(AppError::BusinessRule("You cannot delete your own account".to_string()));
        }

        let target = self.repository.users.get_by_id(id).await?;
        check_manageable(caller, &target)?;

        let (active, _) = self.repository.loans.count_for_user(id).await?;
        if active > 0 && !force {
            return Err(AppError::BusinessRule(format!(
                "User has {} active loan(s), use force=true to delete anyway",
                active
            )));
        }

        self.repository.users.mark_deleted(id).await?;
        tracing::info!(user_id = id, deleted_by = caller.user_id, open_loans = active, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn caller(role: Role) -> UserClaims {
        let now = Utc::now().timestamp();
        UserClaims { sub: "caller".to_string(), user_id: 1, role, exp: now + 60, iat: now }
    }

    fn user(id: i32, role: Role) -> User {
        User {
            id,
            login: format!("user{}", id),
            password: None,
            firstname: None,
            lastname: None,
            email: None,
            student_number: None,
            department: None,
            phone: None,
            language: None,
            role,
            status: UserStatus::Active,
            crea_date: Utc::now(),
            modif_date: None,
        }
    }

    #[test]
    fn test_temporary_password_shape() {
        let password = temporary_password();
        assert_eq!(password.len(), TEMPORARY_PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, temporary_password());
    }

    #[test]
    fn test_librarian_assignable_roles() {
        let librarian = caller(Role::Librarian);
        assert!(check_assignable(&librarian, Role::Student).is_ok());
        assert!(check_assignable(&librarian, Role::Scanner).is_ok());
        assert!(check_assignable(&librarian, Role::Librarian).is_err());
        assert!(check_assignable(&librarian, Role::Admin).is_err());
        assert!(check_assignable(&caller(Role::Admin), Role::Admin).is_ok());
    }

    #[test]
    fn test_librarian_cannot_manage_other_staff() {
        let librarian = caller(Role::Librarian);
        assert!(check_manageable(&librarian, &user(5, Role::Student)).is_ok());
        assert!(check_manageable(&librarian, &user(1, Role::Librarian)).is_ok());
        assert!(check_manageable(&librarian, &user(5, Role::Librarian)).is_err());
        assert!(check_manageable(&librarian, &user(5, Role::Admin)).is_err());
        assert!(check_manageable(&caller(Role::Admin), &user(5, Role::Librarian)).is_ok());
    }
}
