//! Audit log
//!
//! Credit events ghi thành JSONL, mỗi owner một file.

pub mod query;
pub mod store;

pub use query::{EventQuery, EventReader, OwnerActivity};
pub use store::EventStore;
