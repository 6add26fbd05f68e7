//! seguimiento - coach/student training tracker
//!
//! Routine templates set the shape of each week; students and coaches
//! fill in weights per week on top of that shape.

pub mod config;
pub mod db;
pub mod error;
pub mod overlay;
pub mod progress;
pub mod server;
pub mod service;
pub mod template;

pub use db::Database;
pub use error::ServiceError;
