//! Human-readable document numbers.
//!
//! `S-20250105-3F9A0C1B` for sales, `B-20250105-77E0D2A4` for batches:
//! prefix, UTC date, eight hex characters. Uniqueness per organization is
//! enforced by the schema.

use chrono::{DateTime, Utc};
use uuid::Uuid;

fn document_number(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        at.format("%Y%m%d"),
        suffix[..8].to_uppercase()
    )
}

pub fn sale_number(at: DateTime<Utc>) -> String {
    document_number("S", at)
}

pub fn batch_number(at: DateTime<Utc>) -> String {
    document_number("B", at)
}
