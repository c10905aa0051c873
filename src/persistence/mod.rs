//! Persistence module - SQLite-backed config store

mod database;

pub use database::Database;
