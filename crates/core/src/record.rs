//! # Record Module
//!
//! Investor record thuộc về Record Catalog; core chỉ đọc.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Investor contact record.
///
/// `fields` chứa các free-text fields (email, phone, bio, notes, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// View của record sau khi qua presenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentedRecord {
    pub id: String,
    pub name: String,
    pub fields: BTreeMap<String, String>,
    /// True nếu đây là view đã che
    pub locked: bool,
}

impl PresentedRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Bộ lọc tìm kiếm catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    /// Substring khớp với name hoặc fields, không phân biệt hoa thường
    pub query: Option<String>,
    /// Trang, bắt đầu từ 1
    pub page: u32,
    pub per_page: u32,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            query: None,
            page: 1,
            per_page: 20,
        }
    }
}

impl RecordFilter {
    pub fn query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page.max(1);
        self.per_page = per_page.max(1);
        self
    }

    /// Offset cho SQL `LIMIT/OFFSET`
    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.per_page as i64
    }
}

/// Một trang kết quả từ catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPage {
    pub records: Vec<Record>,
    pub total_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = Record::new("INV_001", "Jane Doe")
            .with_field("email", "jane@x.com")
            .with_field("bio", "Angel investor");
        assert_eq!(record.field("email"), Some("jane@x.com"));
        assert_eq!(record.field("phone"), None);
    }

    #[test]
    fn test_filter_offset() {
        let filter = RecordFilter::default().page(3, 10);
        assert_eq!(filter.offset(), 20);

        let filter = RecordFilter::default().page(0, 0);
        assert_eq!(filter.page, 1);
        assert_eq!(filter.offset(), 0);
    }
}
