//! QR checkout ticket model and signed ticket tokens
//!
//! A ticket is persisted server-side and handed to the holder as a signed
//! token. The token is what the QR code carries; a scanner presents it back
//! to be verified and redeemed exactly once before `expires_at`.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::user::UserShort;
use crate::error::AppError;

/// Audience claim carried by every ticket token
pub const TICKET_AUDIENCE: &str = "campuslib-ticket";

/// Token payload format version
pub const TICKET_VERSION: u8 = 1;

/// What a ticket lets its holder do at the desk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TicketPurpose {
    Borrow,
    Return,
    Attendance,
    Equipment,
}

text_enum!(TicketPurpose {
    Borrow => "borrow",
    Return => "return",
    Attendance => "attendance",
    Equipment => "equipment",
});

/// Stored ticket status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Issued,
    Redeemed,
    Revoked,
}

text_enum!(TicketStatus {
    Issued => "issued",
    Redeemed => "redeemed",
    Revoked => "revoked",
});

/// Status as seen by clients: an issued ticket past its expiry is expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TicketState {
    Issued,
    Redeemed,
    Revoked,
    Expired,
}

impl TicketState {
    /// Stored status plus the expiry condition (`Some(true)` past `expires_at`)
    pub fn storage_filter(self) -> (TicketStatus, Option<bool>) {
        match self {
            TicketState::Issued => (TicketStatus::Issued, Some(false)),
            TicketState::Expired => (TicketStatus::Issued, Some(true)),
            TicketState::Redeemed => (TicketStatus::Redeemed, None),
            TicketState::Revoked => (TicketStatus::Revoked, None),
        }
    }
}

/// Ticket record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Ticket {
    pub id: Uuid,
    pub user_id: i32,
    pub purpose: TicketPurpose,
    /// Copies to borrow or return
    pub copy_ids: Vec<i32>,
    pub equipment_id: Option<i32>,
    #[serde(skip_serializing)]
    pub status: TicketStatus,
    pub issued_by: Option<i32>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<i32>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn state(&self, now: DateTime<Utc>) -> TicketState {
        match self.status {
            TicketStatus::Redeemed => TicketState::Redeemed,
            TicketStatus::Revoked => TicketState::Revoked,
            TicketStatus::Issued if self.expires_at <= now => TicketState::Expired,
            TicketStatus::Issued => TicketState::Issued,
        }
    }

    /// Fails unless the ticket can still be redeemed
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.state(now) {
            TicketState::Issued => Ok(()),
            TicketState::Expired => Err(AppError::TicketExpired),
            TicketState::Redeemed => {
                Err(AppError::TicketInvalid("Ticket has already been used".to_string()))
            }
            TicketState::Revoked => {
                Err(AppError::TicketInvalid("Ticket has been revoked".to_string()))
            }
        }
    }
}

/// Ticket as returned to clients, with its computed state
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub state: TicketState,
}

impl TicketView {
    pub fn new(ticket: Ticket, now: DateTime<Utc>) -> Self {
        let state = ticket.state(now);
        Self { ticket, state }
    }
}

/// Signed claims carried by the QR code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketClaims {
    pub v: u8,
    /// Ticket id
    pub jti: String,
    /// Holder user id
    pub sub: String,
    pub purpose: TicketPurpose,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl TicketClaims {
    pub fn for_ticket(ticket: &Ticket) -> Self {
        Self {
            v: TICKET_VERSION,
            jti: ticket.id.to_string(),
            sub: ticket.user_id.to_string(),
            purpose: ticket.purpose,
            aud: TICKET_AUDIENCE.to_string(),
            iat: ticket.issued_at.timestamp(),
            exp: ticket.expires_at.timestamp(),
        }
    }

    pub fn sign(&self, secret: &str) -> Result<String, AppError> {
        encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign ticket: {}", e)))
    }

    /// Check signature, audience and expiry (no leeway)
    pub fn verify(token: &str, secret: &str) -> Result<Self, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[TICKET_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "aud", "sub"]);

        let data = decode::<Self>(
            token.trim(),
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TicketExpired,
            _ => AppError::TicketInvalid("Ticket signature or format is invalid".to_string()),
        })?;

        if data.claims.v != TICKET_VERSION {
            return Err(AppError::TicketInvalid(format!(
                "Unsupported ticket version {}",
                data.claims.v
            )));
        }
        Ok(data.claims)
    }

    pub fn ticket_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.jti)
            .map_err(|_| AppError::TicketInvalid("Malformed ticket id".to_string()))
    }

    pub fn user_id(&self) -> Result<i32, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::TicketInvalid("Malformed ticket holder".to_string()))
    }
}

/// Issue ticket request
#[derive(Debug, Deserialize, ToSchema)]
pub struct IssueTicket {
    pub purpose: TicketPurpose,
    /// Copies by id (borrow / return)
    #[serde(default)]
    pub copy_ids: Vec<i32>,
    /// Copies by barcode (borrow / return)
    #[serde(default)]
    pub barcodes: Vec<String>,
    /// Equipment to check out
    pub equipment_id: Option<i32>,
    /// Holder; staff only, defaults to the caller
    pub user_id: Option<i32>,
}

/// Newly issued ticket with its QR data
#[derive(Debug, Serialize, ToSchema)]
pub struct IssuedTicket {
    pub ticket: TicketView,
    /// Signed token encoded in the QR code
    pub token: String,
    pub qr_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Token presented by a scanner
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScanTicket {
    pub token: String,
}

/// Verified ticket shown to the scanner before redemption
#[derive(Debug, Serialize, ToSchema)]
pub struct TicketPreview {
    pub ticket: TicketView,
    pub holder: UserShort,
}

/// Outcome for one item of a redeemed ticket
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RedeemItem {
    pub copy_id: Option<i32>,
    pub equipment_id: Option<i32>,
    pub ok: bool,
    /// Created loan (borrow) or closed loan (return)
    pub loan_id: Option<i32>,
    pub due_date: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RedeemItem {
    pub fn failed(copy_id: Option<i32>, equipment_id: Option<i32>, error: &AppError) -> Self {
        Self {
            copy_id,
            equipment_id,
            ok: false,
            loan_id: None,
            due_date: None,
            error: Some(error.to_string()),
        }
    }
}

/// Result of redeeming a ticket
#[derive(Debug, Serialize, ToSchema)]
pub struct RedeemOutcome {
    pub ticket: TicketView,
    pub holder: UserShort,
    pub items: Vec<RedeemItem>,
    /// Attendance action for attendance tickets
    pub attendance: Option<super::attendance::AttendanceEvent>,
}

/// Ticket listing parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct TicketQuery {
    pub user_id: Option<i32>,
    /// `expired` selects issued tickets past their expiry; `issued` excludes them
    pub status: Option<TicketState>,
}

/// QR download parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct TicketQrQuery {
    /// Return a data URI in JSON instead of the image file
    pub inline: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "ticket-secret";

    fn ticket(expires_in: Duration) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            user_id: 42,
            purpose: TicketPurpose::Borrow,
            copy_ids: vec![1, 2],
            equipment_id: None,
            status: TicketStatus::Issued,
            issued_by: None,
            issued_at: now,
            expires_at: now + expires_in,
            redeemed_at: None,
            redeemed_by: None,
            revoked_at: None,
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let t = ticket(Duration::minutes(15));
        let token = TicketClaims::for_ticket(&t).sign(SECRET).unwrap();

        let claims = TicketClaims::verify(&token, SECRET).unwrap();
        assert_eq!(claims.ticket_id().unwrap(), t.id);
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.purpose, TicketPurpose::Borrow);
    }

    #[test]
    fn test_expired_token_is_rejected_without_leeway() {
        let mut t = ticket(Duration::minutes(15));
        t.issued_at = Utc::now() - Duration::minutes(20);
        t.expires_at = Utc::now() - Duration::seconds(5);
        let token = TicketClaims::for_ticket(&t).sign(SECRET).unwrap();

        assert!(matches!(
            TicketClaims::verify(&token, SECRET),
            Err(AppError::TicketExpired)
        ));
    }

    #[test]
    fn test_wrong_secret_or_tampering_is_rejected() {
        let t = ticket(Duration::minutes(15));
        let token = TicketClaims::for_ticket(&t).sign(SECRET).unwrap();

        assert!(matches!(
            TicketClaims::verify(&token, "other"),
            Err(AppError::TicketInvalid(_))
        ));

        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let forged = TicketClaims {
            sub: "1".to_string(),
            ..TicketClaims::for_ticket(&t)
        };
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
        parts[1] = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let tampered = parts.join(".");
        assert!(TicketClaims::verify(&tampered, SECRET).is_err());
    }

    #[test]
    fn test_login_token_is_not_a_ticket() {
        let now = Utc::now().timestamp();
        let claims = super::super::user::UserClaims {
            sub: "admin".to_string(),
            user_id: 1,
            role: super::super::user::Role::Admin,
            exp: now + 600,
            iat: now,
        };
        let token = claims.create_token(SECRET).unwrap();
        assert!(TicketClaims::verify(&token, SECRET).is_err());
    }

    #[test]
    fn test_state() {
        let now = Utc::now();
        let mut t = ticket(Duration::minutes(5));
        assert_eq!(t.state(now), TicketState::Issued);
        assert!(t.check_usable(now).is_ok());

        assert_eq!(t.state(now + Duration::minutes(10)), TicketState::Expired);
        assert!(matches!(
            t.check_usable(now + Duration::minutes(10)),
            Err(AppError::TicketExpired)
        ));

        t.status = TicketStatus::Redeemed;
        assert_eq!(t.state(now), TicketState::Redeemed);
        assert!(t.check_usable(now).is_err());

        t.status = TicketStatus::Revoked;
        assert_eq!(t.state(now + Duration::minutes(10)), TicketState::Revoked);
    }

    #[test]
    fn test_listing_filter_splits_issued_and_expired() {
        assert_eq!(TicketState::Issued.storage_filter(), (TicketStatus::Issued, Some(false)));
        assert_eq!(TicketState::Expired.storage_filter(), (TicketStatus::Issued, Some(true)));
        assert_eq!(TicketState::Redeemed.storage_filter(), (TicketStatus::Redeemed, None));

        let state: TicketState = serde_json::from_str("\"expired\"").unwrap();
        assert_eq!(state, TicketState::Expired);
    }
}
