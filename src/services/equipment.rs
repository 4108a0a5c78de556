//! Equipment service

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::equipment::{
        CheckoutEquipment, CreateEquipment, Equipment, EquipmentLoan, EquipmentQuery, UpdateEquipment,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct EquipmentService {
    repository: Repository,
    loan_duration: Duration,
}

impl EquipmentService {
    pub fn new(repository: Repository, loan_duration: Duration) -> Self {
        Self { repository, loan_duration }
    }

    pub async fn list(&self, query: &EquipmentQuery) -> AppResult<Vec<Equipment>> {
        self.repository.equipment.list(query).await
    }

    pub async fn get(&self, id: i32) -> AppResult<Equipment> {
        self.repository.equipment.get_by_id(id).await
    }

    pub async fn create(&self, data: CreateEquipment) -> AppResult<Equipment> {
        let equipment = self.repository.equipment.create(&data).await?;
        tracing::info!(equipment_id = equipment.id, kind = %equipment.kind, "Equipment created");
        Ok(equipment)
    }

    /// Status changes follow the manual transition rules; retiring checked out
    /// equipment closes its open checkout
    pub async fn update(&self, id: i32, data: UpdateEquipment) -> AppResult<Equipment> {
        let equipment = self.repository.equipment.update(id, &data).await?;
        if data.status.is_some() {
            tracing::info!(equipment_id = id, status = %equipment.status, "Equipment status updated");
        }
        Ok(equipment)
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let equipment = self.repository.equipment.get_by_id(id).await?;
        if equipment.status == crate::models::equipment::EquipmentStatus::InUse {
            return Err(AppError::BusinessRule("Equipment is checked out".to_string()));
        }
        self.repository.equipment.delete(id).await
    }

    /// Lend equipment to a user
    pub async fn checkout(&self, id: i32, data: CheckoutEquipment) -> AppResult<EquipmentLoan> {
        self.checkout_for(id, data.user_id, data.due_date, None).await
    }

    pub(crate) async fn checkout_for(
        &self,
        id: i32,
        user_id: i32,
        due_date: Option<chrono::DateTime<Utc>>,
        ticket_id: Option<Uuid>,
    ) -> AppResult<EquipmentLoan> {
        let user = self.repository.users.get_by_id(user_id).await?;
        if !user.is_active() {
            return Err(AppError::BusinessRule(format!("User account is {}", user.status)));
        }

        let now = Utc::now();
        let due_date = due_date.unwrap_or(now + self.loan_duration);
        if due_date <= now {
            return Err(AppError::Validation("Due date must be in the future".to_string()));
        }

        let loan = self.repository.equipment.checkout(id, user_id, due_date, ticket_id).await?;
        tracing::info!(equipment_id = id, user_id, due_date = %loan.due_date, "Equipment checked out");
        Ok(loan)
    }

    pub async fn return_equipment(&self, id: i32) -> AppResult<EquipmentLoan> {
        let loan = self.repository.equipment.return_equipment(id).await?;
        tracing::info!(equipment_id = id, user_id = loan.user_id, "Equipment returned");
        Ok(loan)
    }

    pub async fn loans_history(&self, id: i32) -> AppResult<Vec<EquipmentLoan>> {
        self.repository.equipment.get_by_id(id).await?;
        self.repository.equipment.loans_history(id).await
    }
}
