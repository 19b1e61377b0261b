pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use services::log_service::LogService;

#[derive(Clone)]
pub struct AppState {
    pub log_service: LogService,
}
