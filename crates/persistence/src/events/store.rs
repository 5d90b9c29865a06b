//! Audit log writer
//!
//! Mỗi owner (kể cả anonymous session) có một file JSONL riêng:
//! `data/events/<owner_key>.jsonl`. Đọc lịch sử của một owner chỉ cần
//! mở đúng một file.

use crate::error::PersistenceResult;
use creditgate_core::CreditEvent;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const EVENT_ID_PREFIX: &str = "EVT_";

/// Tên file an toàn cho một owner ID.
///
/// Giữ `[A-Za-z0-9_-]`, các byte khác thành `%XX`, nên hai owner khác
/// nhau không bao giờ chung file.
pub fn owner_file_key(owner_id: &str) -> String {
    let mut key = String::with_capacity(owner_id.len());
    for byte in owner_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            key.push(byte as char);
        } else {
            key.push_str(&format!("%{:02X}", byte));
        }
    }
    key
}

/// Số thứ tự trong `EVT_000123`
pub fn event_sequence(event_id: &str) -> Option<u64> {
    event_id
        .strip_prefix(EVENT_ID_PREFIX)
        .and_then(|n| n.parse::<u64>().ok())
}

pub struct EventStore {
    base_path: PathBuf,
    sequence: AtomicU64,
}

impl EventStore {
    /// Mở store, tạo thư mục nếu chưa có, đánh số tiếp từ event lớn nhất
    pub fn new<P: AsRef<Path>>(base_path: P) -> PersistenceResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let last = Self::owner_files(&base_path)?
            .iter()
            .filter_map(|path| fs::read_to_string(path).ok())
            .flat_map(|content| {
                content
                    .lines()
                    .filter_map(|line| serde_json::from_str::<CreditEvent>(line).ok())
                    .filter_map(|event| event_sequence(&event.event_id))
                    .collect::<Vec<_>>()
            })
            .max()
            .unwrap_or(0);

        Ok(Self {
            base_path,
            sequence: AtomicU64::new(last + 1),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn next_event_id(&self) -> String {
        let id = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{}{:06}", EVENT_ID_PREFIX, id)
    }

    pub fn owner_path(&self, owner_id: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.jsonl", owner_file_key(owner_id)))
    }

    /// Ghi một dòng vào file của `event.owner_id`.
    ///
    /// Cả dòng đi trong một lần `write_all` trên file mở ở chế độ append.
    pub fn append(&self, event: &CreditEvent) -> PersistenceResult<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.owner_path(&event.owner_id))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Các file owner hiện có, sắp theo tên
    pub fn list_files(&self) -> PersistenceResult<Vec<PathBuf>> {
        Self::owner_files(&self.base_path)
    }

    pub(crate) fn owner_files(base_path: &Path) -> PersistenceResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !base_path.exists() {
            return Ok(files);
        }
        for entry in fs::read_dir(base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_owner_file_key() {
        assert_eq!(owner_file_key("user_1"), "user_1");
        assert_eq!(owner_file_key("anon-7f3a"), "anon-7f3a");
        assert_eq!(owner_file_key("a/b"), "a%2Fb");
        assert_eq!(owner_file_key("../x"), "%2E%2E%2Fx");
        assert_ne!(owner_file_key("a.b"), owner_file_key("a_b"));
    }

    #[test]
    fn test_events_partitioned_by_owner() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path()).unwrap();

        for (owner, record) in [("user_1", "INV_001"), ("user_2", "INV_001"), ("user_1", "INV_002")] {
            let event = CreditEvent::record_unlocked(&store.next_event_id(), owner, record);
            store.append(&event).unwrap();
        }

        let files = store.list_files().unwrap();
        assert_eq!(files.len(), 2);

        let user_1 = fs::read_to_string(store.owner_path("user_1")).unwrap();
        assert_eq!(user_1.lines().count(), 2);
        assert!(user_1.contains("EVT_000001"));
        assert!(user_1.contains("EVT_000003"));
        assert!(!user_1.contains("user_2"));
    }

    #[test]
    fn test_sequence_resumes_across_owner_files() {
        let dir = tempdir().unwrap();

        {
            let store = EventStore::new(dir.path()).unwrap();
            store
                .append(&CreditEvent::credits_granted(&store.next_event_id(), "user_1", 3))
                .unwrap();
            store
                .append(&CreditEvent::calculation_consumed(&store.next_event_id(), "anon_1", "irr"))
                .unwrap();
        }

        let store = EventStore::new(dir.path()).unwrap();
        assert_eq!(store.next_event_id(), "EVT_000003");
        assert_eq!(event_sequence("EVT_000042"), Some(42));
        assert_eq!(event_sequence("bogus"), None);
    }
}
