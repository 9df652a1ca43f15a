//! Derives the stored shape of each statement entry. Everything here is pure.
//!
//! Each derivation defaults on its own when its source field is absent:
//! - `memo` is `"<label> - <sub_label>"` when both are present, otherwise empty.
//! - `polarity` and `total_value` come from the signed amount; without one the polarity is empty
//!   and the value is unset.
//! - `position_date` is the entry's date as `YYYY-MM-DD`, or empty.
//! - `entry_text` is the upper-cased narrative, or empty.

use crate::error::TransformError;
use crate::model::{Cnpj, Polarity, StatementEntry, TransformedRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Identifies rows written by this pipeline.
pub const TRANSACTION_TAG: &str = "RUST_V1.0";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Transforms `entries` into stored records, looking up each fund's reference id in `references`.
///
/// # Errors
/// - `MissingEntity` when any entry has no fund. The entries are handed back untouched and
///   nothing in the batch may be loaded.
/// - `UnmappedEntity` or `NonNumericReference` when a fund's reference id cannot be stored.
/// - `BadDate` when an entry's date is present but unreadable.
pub fn transform(
    entries: Vec<StatementEntry>,
    references: &BTreeMap<Cnpj, String>,
) -> Result<Vec<TransformedRecord>, TransformError> {
    if entries.iter().any(|e| e.entity.is_none()) {
        return Err(TransformError::MissingEntity(entries));
    }

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(entity) = entry.entity else {
            continue;
        };
        let reference_id = reference_id(&entity, references)?;
        let position_date = match entry.date.as_deref() {
            Some(raw) => format_date(raw)?,
            None => String::new(),
        };
        let memo = match (&entry.label, &entry.sub_label) {
            (Some(label), Some(sub_label)) => format!("{label} - {sub_label}"),
            _ => String::new(),
        };
        let (total_value, polarity) = match entry.amount {
            Some(amount) => (Some(amount.abs()), Polarity::of(amount)),
            None => (None, Polarity::Unknown),
        };

        records.push(TransformedRecord {
            position_date,
            entity,
            entry_text: entry.narrative.unwrap_or_default().to_uppercase(),
            total_value,
            polarity,
            memo,
            reference_id,
            transaction_tag: TRANSACTION_TAG.to_string(),
        });
    }
    Ok(records)
}

fn reference_id(entity: &Cnpj, references: &BTreeMap<Cnpj, String>) -> Result<i64, TransformError> {
    let value = references
        .get(entity)
        .ok_or_else(|| TransformError::UnmappedEntity {
            entity: entity.clone(),
        })?;
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| TransformError::NonNumericReference {
            entity: entity.clone(),
            value: value.clone(),
        })
}

/// Accepts a plain date, a date and time, or an RFC 3339 timestamp.
fn format_date(raw: &str) -> Result<String, TransformError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    let date = if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        date
    } else if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        dt.date_naive()
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        dt.date()
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        dt.date()
    } else {
        return Err(TransformError::BadDate(raw.to_string()));
    };
    Ok(date.format(DATE_FORMAT).to_string())
}
