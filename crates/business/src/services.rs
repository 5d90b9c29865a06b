//! Service context
//!
//! Database pool + event store dùng chung cho các services.

use creditgate_core::CreditEvent;
use creditgate_persistence::{Database, EventStore};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Context for business operations - contains database access
#[derive(Clone)]
pub struct ServiceContext {
    pool: SqlitePool,
    events: Arc<EventStore>,
}

impl ServiceContext {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
            events: db.shared_events(),
        }
    }

    /// Create from pool and event store directly
    pub fn from_parts(pool: SqlitePool, events: Arc<EventStore>) -> Self {
        Self { pool, events }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn next_event_id(&self) -> String {
        self.events.next_event_id()
    }

    /// Ghi audit event sau khi mutation đã commit.
    ///
    /// Lỗi ghi chỉ được log: state trong database đã là nguồn sự thật.
    pub fn record_event<F>(&self, build: F)
    where
        F: FnOnce(&str) -> CreditEvent,
    {
        let event = build(&self.next_event_id());
        if let Err(e) = self.events.append(&event) {
            tracing::warn!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                owner = %event.owner_id,
                error = %e,
                "failed to append audit event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creditgate_persistence::EventReader;

    #[tokio::test]
    async fn test_record_event_appends() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::in_memory(dir.path()).await.unwrap();
        let ctx = ServiceContext::new(&db);

        ctx.record_event(|id| CreditEvent::credits_granted(id, "user_1", 3));

        let events = EventReader::new(dir.path()).read_all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, "EVT_000001");
        assert_eq!(events[0].amount, Some(3));
    }
}
