//! # Creditgate Persistence
//!
//! Persistence layer - SQLite (ledger, policies, catalog) + JSONL audit events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Database                               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐ │
//! │  │   SQLite    │    │    JSONL    │    │     Repos       │ │
//! │  │  (state)    │    │  (events)   │    │   (queries)     │ │
//! │  └─────────────┘    └─────────────┘    └─────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use creditgate_persistence::{Database, ViewCreditRepo};
//!
//! let db = Database::connect("sqlite:creditgate.db", "data/events").await?;
//! let balance = ViewCreditRepo::get(db.pool(), "user_1").await?;
//! db.events().append(&event)?;
//! ```

pub mod error;
pub mod events;
pub mod sqlite;

pub use error::{PersistenceError, PersistenceResult};
pub use events::{EventQuery, EventReader, EventStore, OwnerActivity};
pub use sqlite::schema::{PolicyRow, RecordRow, UnlockFactRow, ViewCreditRow};
pub use sqlite::{
    init_database, init_in_memory, sqlite_version, PolicyRepo, RecordRepo, UnlockRepo,
    ViewCreditRepo,
};

use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

/// Database facade - SQLite pool + event store
pub struct Database {
    pool: SqlitePool,
    event_store: Arc<EventStore>,
}

impl Database {
    /// Mở (hoặc tạo) database file và chạy migrations.
    ///
    /// # Arguments
    /// * `db_url` - SQLite URL (e.g., "sqlite:creditgate.db")
    /// * `events_path` - Thư mục chứa JSONL events
    pub async fn connect<Q: AsRef<Path>>(db_url: &str, events_path: Q) -> PersistenceResult<Self> {
        let pool = init_database(db_url).await?;
        let event_store = Arc::new(EventStore::new(events_path)?);

        Ok(Self { pool, event_store })
    }

    /// In-memory database, events vẫn ghi ra `events_path`
    pub async fn in_memory<Q: AsRef<Path>>(events_path: Q) -> PersistenceResult<Self> {
        let pool = init_in_memory().await?;
        let event_store = Arc::new(EventStore::new(events_path)?);

        Ok(Self { pool, event_store })
    }

    /// Dùng pool có sẵn (đã migrate)
    pub fn from_parts(pool: SqlitePool, event_store: Arc<EventStore>) -> Self {
        Self { pool, event_store }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &EventStore {
        &self.event_store
    }

    /// Handle dùng chung cho service layer
    pub fn shared_events(&self) -> Arc<EventStore> {
        Arc::clone(&self.event_store)
    }

    /// Event reader cho history/audit
    pub fn event_reader(&self) -> EventReader {
        EventReader::new(self.event_store.base_path())
    }

    /// Đóng pool. Audit log không có buffer nên không cần flush.
    pub async fn close(&self) -> PersistenceResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
