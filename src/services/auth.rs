//! Authentication: login, password hashing, password confirmation

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{CreateUser, LoginResponse, Role, UpdateProfile, User, UserClaims},
    repository::Repository,
    services::redis::{confirm_failures_key, login_failures_key, RedisService},
};

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored hash; accounts without a hash never match
pub fn verify_password(hash: Option<&str>, password: &str) -> AppResult<bool> {
    let Some(hash) = hash else {
        return Ok(false);
    };
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
    redis: RedisService,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig, redis: RedisService) -> Self {
        Self { repository, config, redis }
    }

    fn window_seconds(&self) -> u64 {
        self.config.lockout_minutes * 60
    }

    /// Refuse while the failure counter is at its limit
    async fn check_lockout(&self, key: &str) -> AppResult<()> {
        let (count, ttl) = self.redis.failures(key).await?;
        if count >= self.config.max_failed_attempts as i64 {
            let minutes = ((ttl + 59) / 60).max(1) as u64;
            return Err(AppError::TooManyAttempts(minutes));
        }
        Ok(())
    }

    /// Authenticate by login and password and issue a JWT
    pub async fn login(&self, login: &str, password: &str) -> AppResult<LoginResponse> {
        let key = login_failures_key(login);
        self.check_lockout(&key).await?;

        let user = self.repository.users.get_by_login(login.trim()).await?;

        let valid = match &user {
            Some(user) => verify_password(user.password.as_deref(), password)?,
            None => false,
        };

        let user = match (user, valid) {
            (Some(user), true) => user,
            _ => {
                let count = self.redis.record_failure(&key, self.window_seconds()).await?;
                tracing::warn!(login, attempts = count, "Failed login");
                return Err(AppError::Authentication("Invalid login or password".to_string()));
            }
        };

        if !user.is_active() {
            return Err(AppError::Authentication("Account is blocked".to_string()));
        }

        self.redis.clear(&key).await?;

        let expires_in = self.config.jwt_expiration_hours as i64 * 3600;
        let token = self.create_token_for_user(&user, expires_in)?;

        tracing::info!(user_id = user.id, role = %user.role, "User logged in");

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in,
            user,
        })
    }

    fn create_token_for_user(&self, user: &User, expires_in: i64) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.login.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + expires_in,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Decode a bearer token
    pub fn validate_token(&self, token: &str) -> AppResult<UserClaims> {
        UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))
    }

    /// Current user, refused once blocked or deleted
    pub async fn me(&self, user_id: i32) -> AppResult<User> {
        let user = self.repository.users.get_by_id(user_id).await?;
        if !user.is_active() {
            return Err(AppError::Authentication("Account is not active".to_string()));
        }
        Ok(user)
    }

    /// Account behind a token, refused once blocked, deleted or given another role
    pub async fn current_user(&self, claims: &UserClaims) -> AppResult<User> {
        let user = self.me(claims.user_id).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::Authentication("Account no longer exists".to_string()),
            other => other,
        })?;
        if user.role != claims.role {
            return Err(AppError::Authentication("Role changed, please sign in again".to_string()));
        }
        Ok(user)
    }

    /// Re-check the caller's password before a destructive operation
    pub async fn confirm_password(&self, claims: &UserClaims, password: &str) -> AppResult<()> {
        let user_id = claims.user_id;
        let key = confirm_failures_key(user_id);
        self.check_lockout(&key).await?;

        let user = self.current_user(claims).await?;
        if verify_password(user.password.as_deref(), password)? {
            self.redis.clear(&key).await?;
            return Ok(());
        }

        let count = self.redis.record_failure(&key, self.window_seconds()).await?;
        tracing::warn!(user_id, attempts = count, "Failed password confirmation");
        Err(AppError::Authentication("Password confirmation failed".to_string()))
    }

    /// Update own profile; a new password requires the current one
    pub async fn update_profile(&self, user_id: i32, profile: &UpdateProfile) -> AppResult<User> {
        let user = self.me(user_id).await?;

        if let Some(ref login) = profile.login {
            if self.repository.users.login_exists(login, Some(user_id)).await? {
                return Err(AppError::Conflict("Login already exists".to_string()));
            }
        }

        let password_hash = match &profile.new_password {
            Some(new_password) => {
                let current = profile.current_password.as_deref().ok_or_else(|| {
                    AppError::Validation("Current password is required to set a new one".to_string())
                })?;
                if !verify_password(user.password.as_deref(), current)? {
                    return Err(AppError::Authentication("Current password is incorrect".to_string()));
                }
                Some(hash_password(new_password)?)
            }
            None => None,
        };

        self.repository.users.update_profile(user_id, profile, password_hash).await
    }

    /// Create the configured admin account when no active admin exists
    pub async fn bootstrap_admin(&self) -> AppResult<Option<User>> {
        let Some(ref password) = self.config.bootstrap_admin_password else {
            return Ok(None);
        };
        if self.repository.users.count_admins().await? > 0 {
            return Ok(None);
        }

        let login = self.config.bootstrap_admin_login.clone();
        if self.repository.users.login_exists(&login, None).await? {
            tracing::warn!(%login, "Bootstrap admin login is taken by a non-admin account");
            return Ok(None);
        }

        let data = CreateUser {
            login,
            password: None,
            firstname: None,
            lastname: Some("Administrator".to_string()),
            email: None,
            student_number: None,
            department: None,
            phone: None,
            language: None,
            role: Some(Role::Admin),
        };
        let user = self
            .repository
            .users
            .create(&data, &hash_password(password)?, Role::Admin)
            .await?;

        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(Some(&hash), "correct horse").unwrap());
        assert!(!verify_password(Some(&hash), "wrong horse").unwrap());
    }

    #[test]
    fn test_missing_hash_never_matches() {
        assert!(!verify_password(None, "anything").unwrap());
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(verify_password(Some("not-a-hash"), "x").is_err());
    }
}
