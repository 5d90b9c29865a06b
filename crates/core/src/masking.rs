//! # Masking Module
//!
//! Presenter thuần túy: `(record, unlocked) -> PresentedRecord`.
//!
//! Khi record còn khóa:
//! - Full name và first name trong free-text bị thay bằng `MASK_CHAR`, giữ nguyên độ dài
//! - Structured name giữ chữ cái đầu mỗi phần, phần còn lại là `NAME_FILLER`
//!
//! Độ dài (tính theo ký tự) của mọi field được giữ nguyên.

use crate::record::{PresentedRecord, Record};

/// Ký tự che trong free-text fields
pub const MASK_CHAR: char = '*';

/// Ký tự lấp sau chữ cái đầu của mỗi phần tên
pub const NAME_FILLER: char = '*';

/// Dựng view của record từ trạng thái unlock.
pub fn present(record: &Record, unlocked: bool) -> PresentedRecord {
    if unlocked {
        return PresentedRecord {
            id: record.id.clone(),
            name: record.name.clone(),
            fields: record.fields.clone(),
            locked: false,
        };
    }

    let fields = record
        .fields
        .iter()
        .map(|(key, value)| (key.clone(), redact_text(value, &record.name)))
        .collect();

    PresentedRecord {
        id: record.id.clone(),
        name: mask_name(&record.name),
        fields,
        locked: true,
    }
}

/// "Jane Doe" -> "J*** D**"
pub fn mask_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    name.split(' ')
        .map(mask_name_part)
        .collect::<Vec<_>>()
        .join(" ")
}

fn mask_name_part(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => {
            let mut masked = String::with_capacity(part.len());
            masked.push(first);
            masked.extend(std::iter::repeat(NAME_FILLER).take(chars.count()));
            masked
        }
        None => String::new(),
    }
}

/// Che full name và first name trong `text`, chỉ tại word boundaries.
pub fn redact_text(text: &str, name: &str) -> String {
    if name.trim().is_empty() {
        return text.to_string();
    }

    let mut chars: Vec<char> = text.chars().collect();

    let full: Vec<char> = name.chars().collect();
    mask_occurrences(&mut chars, &full);

    let first: Vec<char> = name.split(' ').next().unwrap_or("").chars().collect();
    if !first.is_empty() && first != full {
        mask_occurrences(&mut chars, &first);
    }

    chars.into_iter().collect()
}

fn mask_occurrences(chars: &mut [char], needle: &[char]) {
    let n = needle.len();
    if n == 0 || chars.len() < n {
        return;
    }

    let mut i = 0;
    while i + n <= chars.len() {
        if matches_at(chars, i, needle)
            && is_left_boundary(chars, i)
            && is_right_boundary(chars, i + n)
        {
            for c in &mut chars[i..i + n] {
                *c = MASK_CHAR;
            }
            i += n;
        } else {
            i += 1;
        }
    }
}

fn matches_at(chars: &[char], start: usize, needle: &[char]) -> bool {
    needle
        .iter()
        .zip(&chars[start..])
        .all(|(a, b)| same_letter(*a, *b))
}

fn same_letter(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Ký tự thuộc về một từ (email `jane@x.com` là một từ)
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '@'
}

/// `.` và `-` nối hai phần của một token (`jane.doe`, `mary-jane`)
fn is_joiner(c: char) -> bool {
    c == '.' || c == '-'
}

fn is_left_boundary(chars: &[char], start: usize) -> bool {
    if start == 0 {
        return true;
    }
    let prev = chars[start - 1];
    if is_word_char(prev) {
        return false;
    }
    !(is_joiner(prev) && start >= 2 && chars[start - 2].is_alphanumeric())
}

fn is_right_boundary(chars: &[char], end: usize) -> bool {
    if end >= chars.len() {
        return true;
    }
    let next = chars[end];
    if is_word_char(next) {
        return false;
    }
    !(is_joiner(next) && end + 1 < chars.len() && chars[end + 1].is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane() -> Record {
        Record::new("INV_001", "Jane Doe")
            .with_field("bio", "Jane is great, contact jane@x.com")
            .with_field("notes", "Met JANE DOE at the summit. jane.doe@fund.io")
    }

    #[test]
    fn test_mask_name_shapes() {
        assert_eq!(mask_name("Jane Doe"), "J*** D**");
        assert_eq!(mask_name("Cher"), "C***");
        assert_eq!(mask_name("J"), "J");
        assert_eq!(mask_name("J R"), "J R");
        assert_eq!(mask_name(""), "");
        assert_eq!(mask_name("Mary Ann Smith"), "M*** A** S****");
    }

    #[test]
    fn test_mask_name_preserves_length_and_initials() {
        for name in ["Jane Doe", "Zoë Ångström", "A  B", "Bartholomew"] {
            let masked = mask_name(name);
            assert_eq!(masked.chars().count(), name.chars().count(), "{}", name);
            for (orig, out) in name.split(' ').zip(masked.split(' ')) {
                assert_eq!(orig.chars().next(), out.chars().next());
            }
        }
    }

    #[test]
    fn test_standalone_first_name_masked_but_email_untouched() {
        let out = redact_text("Jane is great, contact jane@x.com", "Jane Doe");
        assert_eq!(out, "**** is great, contact jane@x.com");
    }

    #[test]
    fn test_full_name_case_insensitive() {
        let out = redact_text("Met JANE DOE at the summit.", "Jane Doe");
        assert_eq!(out, "Met ******** at the summit.");
    }

    #[test]
    fn test_dotted_tokens_not_matched() {
        let out = redact_text("mail jane.doe@fund.io or x.jane", "Jane Doe");
        assert_eq!(out, "mail jane.doe@fund.io or x.jane");
    }

    #[test]
    fn test_sentence_punctuation_is_boundary() {
        let out = redact_text("Ask Jane. Then Jane-", "Jane Doe");
        assert_eq!(out, "Ask ****. Then ****-");
    }

    #[test]
    fn test_embedded_substring_not_matched() {
        let out = redact_text("Janet and Mejane", "Jane Doe");
        assert_eq!(out, "Janet and Mejane");
    }

    #[test]
    fn test_empty_name_leaves_text() {
        assert_eq!(redact_text("anything", ""), "anything");
    }

    #[test]
    fn test_present_locked() {
        let record = jane();
        let view = present(&record, false);
        assert!(view.locked);
        assert_eq!(view.name, "J*** D**");
        assert_eq!(
            view.field("bio"),
            Some("**** is great, contact jane@x.com")
        );
        assert_eq!(
            view.field("notes"),
            Some("Met ******** at the summit. jane.doe@fund.io")
        );
        for (key, value) in &record.fields {
            assert_eq!(
                view.fields[key].chars().count(),
                value.chars().count()
            );
        }
    }

    #[test]
    fn test_present_unlocked_passthrough() {
        let record = jane();
        let view = present(&record, true);
        assert!(!view.locked);
        assert_eq!(view.name, record.name);
        assert_eq!(view.fields, record.fields);
    }

    #[test]
    fn test_present_is_deterministic() {
        let record = jane();
        assert_eq!(present(&record, false), present(&record, false));
    }
}
