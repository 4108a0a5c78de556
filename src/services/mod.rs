//! Business logic services

pub mod attendance;
pub mod auth;
pub mod backup;
pub mod catalog;
pub mod dashboard;
pub mod email;
pub mod equipment;
pub mod loans;
pub mod redis;
pub mod tickets;
pub mod users;

use std::sync::Arc;

use chrono::Duration;

use crate::{config::AppConfig, models::loan::LoanPolicy, qr::QrRenderer, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub equipment: equipment::EquipmentService,
    pub attendance: attendance::AttendanceService,
    pub tickets: tickets::TicketsService,
    pub dashboard: dashboard::DashboardService,
    pub backup: backup::BackupService,
    pub email: email::EmailService,
    pub redis: redis::RedisService,
    repository: Repository,
}

impl Services {
    /// Wire every service; nothing here touches the network
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        redis_service: redis::RedisService,
        qr: Arc<dyn QrRenderer>,
    ) -> Self {
        let email = email::EmailService::new(config.email.clone());
        let loans = loans::LoansService::new(
            repository.clone(),
            LoanPolicy::from(&config.loans),
            email.clone(),
        );
        let equipment = equipment::EquipmentService::new(
            repository.clone(),
            Duration::days(config.loans.equipment_duration_days),
        );
        let attendance = attendance::AttendanceService::new(repository.clone());

        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone(), redis_service.clone()),
            users: users::UsersService::new(repository.clone(), email.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), qr.clone()),
            tickets: tickets::TicketsService::new(
                repository.clone(),
                config.tickets.clone(),
                qr,
                loans.clone(),
                attendance.clone(),
                equipment.clone(),
            ),
            dashboard: dashboard::DashboardService::new(repository.clone()),
            backup: backup::BackupService::new(repository.clone()),
            loans,
            equipment,
            attendance,
            email,
            redis: redis_service,
            repository,
        }
    }

    /// Database and Redis round trips
    pub async fn readiness(&self) -> crate::error::AppResult<()> {
        self.repository.ping().await?;
        self.redis.ping().await
    }
}
