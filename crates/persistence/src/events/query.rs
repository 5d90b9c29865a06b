//! Đọc audit log theo owner
//!
//! `EventQuery` lọc bằng kiểu dữ liệu của domain (`CreditEventType`,
//! `CreditFlavor`, ngày UTC). Khi có owner chỉ đọc file của owner đó.

use crate::error::PersistenceResult;
use crate::events::store::{event_sequence, owner_file_key, EventStore};
use chrono::{DateTime, NaiveDate, Utc};
use creditgate_core::{CreditEvent, CreditEventType, CreditFlavor};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

/// Điều kiện lọc event
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub owner_id: Option<String>,
    /// Rỗng = mọi loại
    pub event_types: Vec<CreditEventType>,
    pub flavor: Option<CreditFlavor>,
    /// Record ID hoặc tên tool
    pub resource_key: Option<String>,
    /// Ngày UTC, tính cả hai đầu
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Chỉ giữ N event mới nhất
    pub latest: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, owner_id: &str) -> Self {
        self.owner_id = Some(owner_id.to_string());
        self
    }

    pub fn event_types(mut self, types: Vec<CreditEventType>) -> Self {
        self.event_types = types;
        self
    }

    pub fn flavor(mut self, flavor: CreditFlavor) -> Self {
        self.flavor = Some(flavor);
        self
    }

    pub fn resource(mut self, resource_key: &str) -> Self {
        self.resource_key = Some(resource_key.to_string());
        self
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.from = Some(date);
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.to = Some(date);
        self
    }

    pub fn latest(mut self, n: usize) -> Self {
        self.latest = Some(n);
        self
    }

    pub fn matches(&self, event: &CreditEvent) -> bool {
        if self
            .owner_id
            .as_ref()
            .is_some_and(|owner| event.owner_id != *owner)
        {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        if self.flavor.is_some_and(|flavor| event.flavor != flavor) {
            return false;
        }
        if let Some(ref key) = self.resource_key {
            if event.resource_key.as_deref() != Some(key.as_str()) {
                return false;
            }
        }
        let day = event.timestamp.date_naive();
        if self.from.is_some_and(|from| day < from) || self.to.is_some_and(|to| day > to) {
            return false;
        }
        true
    }
}

/// Tổng hợp hoạt động của một owner từ audit log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerActivity {
    pub credits_granted: i64,
    pub records_unlocked: usize,
    /// Số lần tiêu theo tool (`irr`, `npv`, ...)
    pub calculations: BTreeMap<String, usize>,
    pub rollovers: usize,
    /// Số lần bị từ chối theo reason (`insufficient_credits`, ...)
    pub denials: BTreeMap<String, usize>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl OwnerActivity {
    fn apply(&mut self, event: &CreditEvent) {
        match event.event_type {
            CreditEventType::CreditsGranted => {
                self.credits_granted += event.amount.unwrap_or(0);
            }
            CreditEventType::RecordUnlocked => self.records_unlocked += 1,
            CreditEventType::CalculationConsumed => {
                let tool = event.resource_key.clone().unwrap_or_default();
                *self.calculations.entry(tool).or_default() += 1;
            }
            CreditEventType::PeriodRolledOver => self.rollovers += 1,
            CreditEventType::ConsumeDenied => {
                let reason = event.detail.clone().unwrap_or_default();
                *self.denials.entry(reason).or_default() += 1;
            }
        }
        if self.last_event_at.map_or(true, |last| event.timestamp > last) {
            self.last_event_at = Some(event.timestamp);
        }
    }

    pub fn total_calculations(&self) -> usize {
        self.calculations.values().sum()
    }

    pub fn total_denials(&self) -> usize {
        self.denials.values().sum()
    }
}

pub struct EventReader {
    base_path: PathBuf,
}

impl EventReader {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn read_file(path: &Path) -> PersistenceResult<Vec<CreditEvent>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }

    /// Toàn bộ log của một owner, theo thứ tự ghi
    pub fn read_owner(&self, owner_id: &str) -> PersistenceResult<Vec<CreditEvent>> {
        let path = self
            .base_path
            .join(format!("{}.jsonl", owner_file_key(owner_id)));
        let mut events = Self::read_file(&path)?;
        sort_events(&mut events);
        Ok(events)
    }

    /// Mọi owner, gộp theo (timestamp, event ID)
    pub fn read_all(&self) -> PersistenceResult<Vec<CreditEvent>> {
        let mut events = Vec::new();
        for path in EventStore::owner_files(&self.base_path)? {
            events.extend(Self::read_file(&path)?);
        }
        sort_events(&mut events);
        Ok(events)
    }

    pub fn query(&self, query: &EventQuery) -> PersistenceResult<Vec<CreditEvent>> {
        let events = match query.owner_id {
            Some(ref owner_id) => self.read_owner(owner_id)?,
            None => self.read_all()?,
        };
        let mut events: Vec<_> = events.into_iter().filter(|e| query.matches(e)).collect();
        if let Some(n) = query.latest {
            let skip = events.len().saturating_sub(n);
            events.drain(..skip);
        }
        Ok(events)
    }

    pub fn activity(&self, owner_id: &str) -> PersistenceResult<OwnerActivity> {
        let mut activity = OwnerActivity::default();
        for event in self.read_owner(owner_id)? {
            activity.apply(&event);
        }
        Ok(activity)
    }
}

fn sort_events(events: &mut [CreditEvent]) {
    events.sort_by_key(|e| (e.timestamp, event_sequence(&e.event_id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use creditgate_core::DenyReason;
    use tempfile::tempdir;

    fn seeded_store(dir: &Path) -> EventStore {
        let store = EventStore::new(dir).unwrap();
        let events = vec![
            CreditEvent::credits_granted(&store.next_event_id(), "user_1", 3),
            CreditEvent::record_unlocked(&store.next_event_id(), "user_1", "INV_001"),
            CreditEvent::calculation_consumed(&store.next_event_id(), "anon_9", "irr"),
            CreditEvent::calculation_consumed(&store.next_event_id(), "user_1", "irr"),
            CreditEvent::calculation_consumed(&store.next_event_id(), "user_1", "npv"),
            CreditEvent::consume_denied(
                &store.next_event_id(),
                "user_1",
                CreditFlavor::RecordUnlock,
                "INV_002",
                &DenyReason::InsufficientCredits,
            ),
        ];
        for event in &events {
            store.append(event).unwrap();
        }
        store
    }

    #[test]
    fn test_read_owner_only_sees_own_file() {
        let dir = tempdir().unwrap();
        seeded_store(dir.path());
        let reader = EventReader::new(dir.path());

        let events = reader.read_owner("user_1").unwrap();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.owner_id == "user_1"));
        assert_eq!(events[0].event_type, CreditEventType::CreditsGranted);

        assert!(reader.read_owner("nobody").unwrap().is_empty());
        assert_eq!(reader.read_all().unwrap().len(), 6);
    }

    #[test]
    fn test_read_missing_directory() {
        let dir = tempdir().unwrap();
        let reader = EventReader::new(dir.path().join("nope"));
        assert!(reader.read_all().unwrap().is_empty());
        assert_eq!(reader.activity("user_1").unwrap(), OwnerActivity::default());
    }

    #[test]
    fn test_query_typed_filters() {
        let dir = tempdir().unwrap();
        seeded_store(dir.path());
        let reader = EventReader::new(dir.path());

        let calcs = reader
            .query(&EventQuery::new().flavor(CreditFlavor::Calculation))
            .unwrap();
        assert_eq!(calcs.len(), 3);

        let irr = reader
            .query(&EventQuery::new().owner("user_1").resource("irr"))
            .unwrap();
        assert_eq!(irr.len(), 1);
        assert_eq!(irr[0].event_id, "EVT_000004");

        let denied = reader
            .query(&EventQuery::new().event_types(vec![CreditEventType::ConsumeDenied]))
            .unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].detail.as_deref(), Some("insufficient_credits"));

        let latest = reader
            .query(&EventQuery::new().owner("user_1").latest(2))
            .unwrap();
        let ids: Vec<_> = latest.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["EVT_000005", "EVT_000006"]);
    }

    #[test]
    fn test_query_date_bounds() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path()).unwrap();
        let now = Utc::now();

        let mut old = CreditEvent::credits_granted(&store.next_event_id(), "user_1", 3);
        old.timestamp = now - Duration::days(10);
        store.append(&old).unwrap();
        store
            .append(&CreditEvent::record_unlocked(&store.next_event_id(), "user_1", "INV_001"))
            .unwrap();

        let reader = EventReader::new(dir.path());
        let today = now.date_naive();

        let recent = reader.query(&EventQuery::new().since(today)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_type, CreditEventType::RecordUnlocked);

        let earlier = reader
            .query(&EventQuery::new().until(today - Duration::days(1)))
            .unwrap();
        assert_eq!(earlier.len(), 1);
        assert_eq!(earlier[0].event_type, CreditEventType::CreditsGranted);
    }

    #[test]
    fn test_owner_activity() {
        let dir = tempdir().unwrap();
        seeded_store(dir.path());
        let reader = EventReader::new(dir.path());

        let activity = reader.activity("user_1").unwrap();
        assert_eq!(activity.credits_granted, 3);
        assert_eq!(activity.records_unlocked, 1);
        assert_eq!(activity.calculations.get("irr"), Some(&1));
        assert_eq!(activity.calculations.get("npv"), Some(&1));
        assert_eq!(activity.total_calculations(), 2);
        assert_eq!(activity.denials.get("insufficient_credits"), Some(&1));
        assert_eq!(activity.total_denials(), 1);
        assert!(activity.last_event_at.is_some());

        let anon = reader.activity("anon_9").unwrap();
        assert_eq!(anon.total_calculations(), 1);
        assert_eq!(anon.credits_granted, 0);
    }
}
