//! SQLite persistence module
//!
//! Repository pattern cho SQLite database access.

pub mod repos;
pub mod schema;

pub use repos::{
    create_pool, init_database, init_in_memory, run_migrations, sqlite_version, PolicyRepo,
    RecordRepo, UnlockRepo, ViewCreditRepo,
};
pub use schema::{PolicyRow, RecordRow, UnlockFactRow, ViewCreditRow};
