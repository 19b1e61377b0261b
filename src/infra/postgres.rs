pub mod activity_log_repo;
