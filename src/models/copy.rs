//! Book copy (physical exemplar) model

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

static BARCODE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9-]{3,32}$").expect("valid barcode regex"));

/// Upper-case a barcode and check its shape
pub fn normalize_barcode(raw: &str) -> Result<String, String> {
    let barcode = raw.trim().to_ascii_uppercase();
    if BARCODE_SHAPE.is_match(&barcode) {
        Ok(barcode)
    } else {
        Err(format!(
            "Invalid barcode '{}': 3 to 32 letters, digits or hyphens",
            raw
        ))
    }
}

/// Barcode assigned when none is supplied: `B{book:06}-{n:03}`
pub fn generated_barcode(book_id: i32, sequence: i64) -> String {
    format!("B{:06}-{:03}", book_id, sequence)
}

/// Copy lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Active,
    Damaged,
    Lost,
    Withdrawn,
}

text_enum!(CopyStatus {
    Active => "active",
    Damaged => "damaged",
    Lost => "lost",
    Withdrawn => "withdrawn",
});

/// Copy record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookCopy {
    pub id: i32,
    pub book_id: i32,
    pub barcode: String,
    pub call_number: Option<String>,
    pub location: Option<String>,
    /// Reference-only copies are not borrowable
    pub borrowable: bool,
    pub status: CopyStatus,
    pub notes: Option<String>,
    pub crea_date: DateTime<Utc>,
    pub modif_date: Option<DateTime<Utc>>,
    /// Open loan on this copy, if any
    #[sqlx(default)]
    #[serde(default)]
    pub loan_id: Option<i32>,
    #[sqlx(default)]
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl BookCopy {
    pub fn is_available(&self) -> bool {
        self.borrowable && self.status == CopyStatus::Active && self.loan_id.is_none()
    }
}

/// Create copy request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CreateCopy {
    /// Generated when omitted
    pub barcode: Option<String>,
    pub call_number: Option<String>,
    pub location: Option<String>,
    pub borrowable: Option<bool>,
    pub notes: Option<String>,
}

/// Update copy request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCopy {
    pub barcode: Option<String>,
    pub call_number: Option<String>,
    pub location: Option<String>,
    pub borrowable: Option<bool>,
    pub status: Option<CopyStatus>,
    pub notes: Option<String>,
}

/// Data encoded in a copy's shelf label QR code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CopyLabel {
    #[serde(rename = "type")]
    pub kind: String,
    pub copy_id: i32,
    pub book_id: i32,
    pub barcode: String,
}

impl CopyLabel {
    pub fn for_copy(copy: &BookCopy) -> Self {
        Self {
            kind: "copy".to_string(),
            copy_id: copy.id,
            book_id: copy.book_id,
            barcode: copy.barcode.clone(),
        }
    }
}

/// Copy with its label payload and QR image URL
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CopyQr {
    pub copy_id: i32,
    pub barcode: String,
    /// JSON text encoded in the QR code
    pub payload: String,
    pub qr_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy() -> BookCopy {
        BookCopy {
            id: 3,
            book_id: 12,
            barcode: "B000012-001".to_string(),
            call_number: None,
            location: None,
            borrowable: true,
            status: CopyStatus::Active,
            notes: None,
            crea_date: Utc::now(),
            modif_date: None,
            loan_id: None,
            due_date: None,
        }
    }

    #[test]
    fn test_generated_barcode_is_valid() {
        let barcode = generated_barcode(12, 1);
        assert_eq!(barcode, "B000012-001");
        assert_eq!(normalize_barcode(&barcode).unwrap(), barcode);
    }

    #[test]
    fn test_normalize_barcode() {
        assert_eq!(normalize_barcode(" lib-0042 ").unwrap(), "LIB-0042");
        assert!(normalize_barcode("ab").is_err());
        assert!(normalize_barcode("has space").is_err());
        assert!(normalize_barcode("élan").is_err());
    }

    #[test]
    fn test_availability() {
        let mut c = copy();
        assert!(c.is_available());

        c.loan_id = Some(9);
        assert!(!c.is_available());

        let mut c = copy();
        c.status = CopyStatus::Lost;
        assert!(!c.is_available());

        let mut c = copy();
        c.borrowable = false;
        assert!(!c.is_available());
    }

    #[test]
    fn test_label_payload_shape() {
        let label = CopyLabel::for_copy(&copy());
        let json = serde_json::to_value(&label).unwrap();
        assert_eq!(json["type"], "copy");
        assert_eq!(json["copy_id"], 3);
        assert_eq!(json["barcode"], "B000012-001");
    }
}
