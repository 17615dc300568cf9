//! Infrastructure layer - external concerns

pub mod database;

pub use database::{init_database, DatabaseConfig, SeaOrmStore};
