pub mod activity_log;
pub mod broker;
pub mod error;
pub mod id;
pub mod store;
