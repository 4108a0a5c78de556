//! User model, roles and JWT claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;

/// Account role, one dashboard per role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Librarian,
    Student,
    Scanner,
}

text_enum!(Role {
    Admin => "admin",
    Librarian => "librarian",
    Student => "student",
    Scanner => "scanner",
});

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Librarian, Role::Student, Role::Scanner];

    /// Admins and librarians
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Librarian)
    }
}

/// Rights level on a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Rights {
    None = 0,
    Read = 1,
    Write = 2,
}

/// Rights granted to a role, per domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserRights {
    pub catalog: Rights,
    pub users: Rights,
    pub loans: Rights,
    pub equipment: Rights,
    pub attendance: Rights,
    /// Write allows verifying and redeeming other users' tickets
    pub tickets: Rights,
    pub backup: Rights,
}

impl UserRights {
    pub fn for_role(role: Role) -> Self {
        use Rights::*;
        match role {
            Role::Admin => Self {
                catalog: Write,
                users: Write,
                loans: Write,
                equipment: Write,
                attendance: Write,
                tickets: Write,
                backup: Write,
            },
            Role::Librarian => Self {
                catalog: Write,
                users: Write,
                loans: Write,
                equipment: Write,
                attendance: Write,
                tickets: Write,
                backup: None,
            },
            Role::Student => Self {
                catalog: Read,
                users: None,
                loans: None,
                equipment: Read,
                attendance: None,
                tickets: None,
                backup: None,
            },
            Role::Scanner => Self {
                catalog: Read,
                users: Read,
                loans: Read,
                equipment: Read,
                attendance: Write,
                tickets: Write,
                backup: None,
            },
        }
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Blocked,
    Deleted,
}

text_enum!(UserStatus {
    Active => "active",
    Blocked => "blocked",
    Deleted => "deleted",
});

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub login: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    /// University student or staff number
    pub student_number: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    /// Preferred language (ISO 639-1 code: "fr", "en", etc.)
    pub language: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub crea_date: DateTime<Utc>,
    pub modif_date: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> String {
        match (&self.firstname, &self.lastname) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (None, Some(last)) => last.clone(),
            (Some(first), None) => first.clone(),
            (None, None) => self.login.clone(),
        }
    }

    pub fn search_key(&self) -> String {
        crate::search::search_key([
            self.firstname.as_deref(),
            self.lastname.as_deref(),
            Some(self.login.as_str()),
            self.email.as_deref(),
            self.student_number.as_deref(),
        ])
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Short user representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserShort {
    pub id: i32,
    pub login: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub student_number: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    /// Open loans
    pub nb_loans: i64,
    /// Open loans past their due date
    pub nb_late_loans: i64,
}

/// User query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    /// Search in names, login, email and student number
    pub q: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create user request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    /// Login (username), unique regardless of case
    #[validate(length(min = 3, max = 64, message = "Login must be 3 to 64 characters"))]
    pub login: String,
    /// Generated and returned once when omitted
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub student_number: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    #[validate(length(min = 2, max = 5, message = "Language code must be 2-5 characters"))]
    pub language: Option<String>,
    /// Defaults to student
    pub role: Option<Role>,
}

/// Update user request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 3, max = 64, message = "Login must be 3 to 64 characters"))]
    pub login: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub student_number: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    #[validate(length(min = 2, max = 5, message = "Language code must be 2-5 characters"))]
    pub language: Option<String>,
    /// Only active and blocked can be set here; deletion goes through DELETE
    pub status: Option<UserStatus>,
}

/// Update own profile request (for authenticated users)
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfile {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    /// Login/username (must be unique if provided)
    #[validate(length(min = 3, max = 64, message = "Login must be 3 to 64 characters"))]
    pub login: Option<String>,
    pub phone: Option<String>,
    /// Current password (required to change password)
    pub current_password: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: Option<String>,
    #[validate(length(min = 2, max = 5, message = "Language code must be 2-5 characters"))]
    pub language: Option<String>,
}

/// Change role request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRole {
    pub role: Role,
}

/// Login request
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// Login response with bearer token
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub user: User,
}

/// Password confirmation request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmPasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmPasswordResponse {
    pub confirmed: bool,
}

/// Created account; the generated password is only ever returned here
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedUser {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_password: Option<String>,
}

/// Delete user parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct DeleteUserQuery {
    /// Delete even with open loans
    pub force: Option<bool>,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn rights(&self) -> UserRights {
        UserRights::for_role(self.role)
    }

    fn check(granted: Rights, needed: Rights, action: &str) -> Result<(), AppError> {
        if granted >= needed {
            Ok(())
        } else {
            Err(AppError::Authorization(format!("Insufficient rights to {}", action)))
        }
    }

    // Authorization checks
    pub fn require_read_catalog(&self) -> Result<(), AppError> {
        Self::check(self.rights().catalog, Rights::Read, "read the catalog")
    }

    pub fn require_write_catalog(&self) -> Result<(), AppError> {
        Self::check(self.rights().catalog, Rights::Write, "edit the catalog")
    }

    pub fn require_read_users(&self) -> Result<(), AppError> {
        Self::check(self.rights().users, Rights::Read, "read users")
    }

    pub fn require_write_users(&self) -> Result<(), AppError> {
        Self::check(self.rights().users, Rights::Write, "write users")
    }

    pub fn require_read_loans(&self) -> Result<(), AppError> {
        Self::check(self.rights().loans, Rights::Read, "read loans")
    }

    pub fn require_write_loans(&self) -> Result<(), AppError> {
        Self::check(self.rights().loans, Rights::Write, "manage loans")
    }

    pub fn require_read_equipment(&self) -> Result<(), AppError> {
        Self::check(self.rights().equipment, Rights::Read, "read equipment")
    }

    pub fn require_write_equipment(&self) -> Result<(), AppError> {
        Self::check(self.rights().equipment, Rights::Write, "manage equipment")
    }

    pub fn require_read_attendance(&self) -> Result<(), AppError> {
        Self::check(self.rights().attendance, Rights::Read, "read attendance")
    }

    pub fn require_write_attendance(&self) -> Result<(), AppError> {
        Self::check(self.rights().attendance, Rights::Write, "record attendance")
    }

    pub fn require_redeem_tickets(&self) -> Result<(), AppError> {
        Self::check(self.rights().tickets, Rights::Write, "scan tickets")
    }

    pub fn require_backup(&self) -> Result<(), AppError> {
        Self::check(self.rights().backup, Rights::Write, "manage backups")
    }

    /// Own record, or staff/scanner with read access to users
    pub fn require_self_or_read_users(&self, user_id: i32) -> Result<(), AppError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            self.require_read_users()
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Library staff privileges required".to_string()))
        }
    }

    /// Check if user is admin
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require admin privileges
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> UserClaims {
        let now = Utc::now().timestamp();
        UserClaims {
            sub: "jdoe".to_string(),
            user_id: 7,
            role,
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn test_role_slug_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!(" Librarian ".parse::<Role>().unwrap(), Role::Librarian);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Scanner).unwrap(), "\"scanner\"");
        let role: Role = serde_json::from_str("\"student\"").unwrap();
        assert_eq!(role, Role::Student);
    }

    #[test]
    fn test_rights_matrix() {
        let student = UserRights::for_role(Role::Student);
        assert_eq!(student.catalog, Rights::Read);
        assert_eq!(student.users, Rights::None);
        assert_eq!(student.tickets, Rights::None);

        let scanner = UserRights::for_role(Role::Scanner);
        assert_eq!(scanner.tickets, Rights::Write);
        assert_eq!(scanner.catalog, Rights::Read);

        assert_eq!(UserRights::for_role(Role::Librarian).backup, Rights::None);
        assert_eq!(UserRights::for_role(Role::Admin).backup, Rights::Write);
    }

    #[test]
    fn test_authorization_checks() {
        let student = claims(Role::Student);
        assert!(student.require_read_catalog().is_ok());
        assert!(student.require_write_catalog().is_err());
        assert!(student.require_redeem_tickets().is_err());
        assert!(student.require_self_or_read_users(7).is_ok());
        assert!(student.require_self_or_read_users(8).is_err());

        let scanner = claims(Role::Scanner);
        assert!(scanner.require_redeem_tickets().is_ok());
        assert!(scanner.require_write_users().is_err());
        assert!(scanner.require_self_or_read_users(8).is_ok());

        let librarian = claims(Role::Librarian);
        assert!(librarian.require_write_loans().is_ok());
        assert!(librarian.require_backup().is_err());
        assert!(librarian.require_admin().is_err());
        assert!(claims(Role::Admin).require_admin().is_ok());
    }

    #[test]
    fn test_token_round_trip() {
        let original = claims(Role::Librarian);
        let token = original.create_token("secret").unwrap();
        let decoded = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(decoded.user_id, 7);
        assert_eq!(decoded.role, Role::Librarian);

        assert!(UserClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut expired = claims(Role::Admin);
        expired.iat -= 7200;
        expired.exp = Utc::now().timestamp() - 3600;
        let token = expired.create_token("secret").unwrap();
        assert!(UserClaims::from_token(&token, "secret").is_err());
    }

    #[test]
    fn test_display_name_falls_back_to_login() {
        let user = User {
            id: 1,
            login: "jdoe".to_string(),
            password: None,
            firstname: None,
            lastname: None,
            email: None,
            student_number: None,
            department: None,
            phone: None,
            language: None,
            role: Role::Student,
            status: UserStatus::Active,
            crea_date: Utc::now(),
            modif_date: None,
        };
        assert_eq!(user.display_name(), "jdoe");
        assert!(user.is_active());
    }
}
