//! Exercise tracking service: users, their exercise logs, and the warp API
//! in front of them.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod exercise;
pub mod log_query;
pub mod telemetry;

pub use db::{LogEntry, Store, User};
pub use error::ApiError;
