//! Campuslib Server
//!
//! REST JSON API for a university library: catalog, users, loans, equipment,
//! attendance and QR checkout tickets, with role-based access for admins,
//! librarians, students and desk scanners.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod qr;
pub mod repository;
pub mod search;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
