pub mod consumer;
pub mod log_service;
pub mod registry;
pub mod worker;
