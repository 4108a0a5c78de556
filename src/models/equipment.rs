//! Equipment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;

/// Kind of lendable equipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentKind {
    Laptop,
    Tablet,
    Ereader,
    Projector,
    Camera,
    Other,
}

text_enum!(EquipmentKind {
    Laptop => "laptop",
    Tablet => "tablet",
    Ereader => "ereader",
    Projector => "projector",
    Camera => "camera",
    Other => "other",
});

/// Equipment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    Available,
    InUse,
    Maintenance,
    Retired,
}

text_enum!(EquipmentStatus {
    Available => "available",
    InUse => "in_use",
    Maintenance => "maintenance",
    Retired => "retired",
});

impl EquipmentStatus {
    /// Transition allowed through an update request (checkout and return are separate)
    pub fn check_manual_transition(self, to: EquipmentStatus) -> Result<(), AppError> {
        use EquipmentStatus::*;
        match (self, to) {
            (from, to) if from == to => Ok(()),
            (_, InUse) => Err(AppError::BusinessRule(
                "Equipment goes in use through checkout".to_string(),
            )),
            // Retiring closes the open checkout
            (InUse, Retired) => Ok(()),
            (InUse, _) => Err(AppError::BusinessRule(
                "Equipment in use must be returned first".to_string(),
            )),
            (Retired, _) => Err(AppError::BusinessRule(
                "Retired equipment cannot be reactivated".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn check_checkout(self) -> Result<(), AppError> {
        match self {
            EquipmentStatus::Available => Ok(()),
            other => Err(AppError::BusinessRule(format!(
                "Equipment is not available ({})",
                other
            ))),
        }
    }
}

/// Equipment record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Equipment {
    pub id: i32,
    pub name: String,
    pub kind: EquipmentKind,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    pub status: EquipmentStatus,
    pub notes: Option<String>,
    pub crea_date: DateTime<Utc>,
    pub modif_date: Option<DateTime<Utc>>,
}

/// Equipment query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct EquipmentQuery {
    /// Search in name and serial number
    pub q: Option<String>,
    pub kind: Option<EquipmentKind>,
    pub status: Option<EquipmentStatus>,
}

/// Create equipment request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateEquipment {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub kind: Option<EquipmentKind>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Update equipment request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEquipment {
    #[validate(length(min = 1, max = 200, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub kind: Option<EquipmentKind>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    pub status: Option<EquipmentStatus>,
    pub notes: Option<String>,
}

/// Equipment checkout record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EquipmentLoan {
    pub id: i32,
    pub equipment_id: i32,
    pub user_id: i32,
    pub user_login: String,
    pub date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_date: Option<DateTime<Utc>>,
}

/// Checkout request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutEquipment {
    pub user_id: i32,
    /// Defaults to the configured equipment loan duration
    pub due_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::EquipmentStatus::*;

    #[test]
    fn test_manual_transitions() {
        assert!(Available.check_manual_transition(Maintenance).is_ok());
        assert!(Maintenance.check_manual_transition(Available).is_ok());
        assert!(Available.check_manual_transition(Retired).is_ok());
        assert!(Available.check_manual_transition(Available).is_ok());

        assert!(Available.check_manual_transition(InUse).is_err());
        assert!(InUse.check_manual_transition(Available).is_err());
        assert!(Retired.check_manual_transition(Available).is_err());
    }

    #[test]
    fn test_equipment_in_use_can_be_retired() {
        assert!(InUse.check_manual_transition(Retired).is_ok());
        assert!(InUse.check_manual_transition(Maintenance).is_err());
        assert!(Maintenance.check_manual_transition(Retired).is_ok());
        assert!(Retired.check_manual_transition(Retired).is_ok());
    }

    #[test]
    fn test_checkout_requires_available() {
        assert!(Available.check_checkout().is_ok());
        assert!(InUse.check_checkout().is_err());
        assert!(Maintenance.check_checkout().is_err());
        assert!(Retired.check_checkout().is_err());
    }

    #[test]
    fn test_status_slug() {
        assert_eq!(InUse.as_str(), "in_use");
        assert_eq!("in_use".parse::<super::EquipmentStatus>().unwrap(), InUse);
        assert_eq!(serde_json::to_string(&InUse).unwrap(), "\"in_use\"");
    }
}
