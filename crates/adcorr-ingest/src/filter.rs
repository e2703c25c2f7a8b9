//! Click/conversion filtering and deduplication

use adcorr_common::RawRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::FilterError;

pub const CONVERSION_TYPE_FIELD: &str = "conversion_type";
pub const DEFAULT_CONVERSION_TYPE: &str = "signup";

/// Keeps records whose `field` holds exactly the text `value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionFilter {
    pub field: String,
    pub value: String,
}

impl ConversionFilter {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            field: CONVERSION_TYPE_FIELD.to_string(),
            value: value.into(),
        }
    }
}

impl Default for ConversionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERSION_TYPE)
    }
}

/// Filter by the predicate, then drop field-for-field duplicates
///
/// Every record must carry the predicate field or the whole batch fails.
/// Survivors keep the order in which they were first seen.
pub fn filter_dedup(
    records: Vec<RawRecord>,
    filter: &ConversionFilter,
) -> Result<Vec<RawRecord>, FilterError> {
    if let Some((index, record)) = records
        .iter()
        .enumerate()
        .find(|(_, r)| !r.contains(&filter.field))
    {
        return Err(FilterError {
            field: filter.field.clone(),
            index,
            record: record.to_json_string(),
        });
    }

    let mut seen: HashSet<RawRecord> = HashSet::new();
    let mut unique = Vec::new();

    for record in records {
        let matches = record
            .get(&filter.field)
            .and_then(|v| v.as_text())
            .is_some_and(|v| v == filter.value);

        if matches && !seen.contains(&record) {
            seen.insert(record.clone());
            unique.push(record);
        }
    }

    Ok(unique)
}
