//! Impression normalization
//!
//! Rewrites `timestamp` from `"YYYY-MM-DD HH:MM:SS"` to the ISO-8601 shape
//! `"YYYY-MM-DDTHH:MM:SS"` and adds a `country` field derived from `website`.

use adcorr_common::{FieldValue, RawRecord};
use std::collections::HashMap;

use crate::error::NormalizationError;

pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const WEBSITE_FIELD: &str = "website";
pub const COUNTRY_FIELD: &str = "country";

/// Country used when no lookup table is configured
pub const DEFAULT_COUNTRY: &str = "US";

/// Maps a website identifier to a country code
pub trait CountryLookup: Send + Sync {
    fn country_for(&self, website: &str) -> String;
}

/// Answers the same country for every website
#[derive(Debug, Clone)]
pub struct FixedCountry {
    country: String,
}

impl FixedCountry {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
        }
    }
}

impl Default for FixedCountry {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY)
    }
}

impl CountryLookup for FixedCountry {
    fn country_for(&self, _website: &str) -> String {
        self.country.clone()
    }
}

/// Exact website lookup with a fallback country
#[derive(Debug, Clone)]
pub struct TableLookup {
    table: HashMap<String, String>,
    fallback: String,
}

impl TableLookup {
    pub fn new(table: HashMap<String, String>, fallback: impl Into<String>) -> Self {
        Self {
            table,
            fallback: fallback.into(),
        }
    }
}

impl CountryLookup for TableLookup {
    fn country_for(&self, website: &str) -> String {
        self.table
            .get(website)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Normalize a batch of impressions
///
/// Fails on the first impression missing `timestamp` or `website`; no
/// partial output is returned. Text timestamps have every space replaced
/// with `T` and are otherwise left alone, so already-normalized values pass
/// through unchanged. Non-text timestamps are kept as they are.
pub fn normalize(
    impressions: Vec<RawRecord>,
    lookup: &dyn CountryLookup,
) -> Result<Vec<RawRecord>, NormalizationError> {
    let mut normalized = Vec::with_capacity(impressions.len());

    for (index, mut impression) in impressions.into_iter().enumerate() {
        let timestamp = match impression.get(TIMESTAMP_FIELD) {
            Some(FieldValue::Text(ts)) => FieldValue::Text(ts.replace(' ', "T")),
            Some(other) => other.clone(),
            None => {
                return Err(NormalizationError {
                    field: TIMESTAMP_FIELD,
                    index,
                })
            },
        };

        let country = match impression.get(WEBSITE_FIELD) {
            Some(FieldValue::Text(site)) => lookup.country_for(site),
            Some(other) => lookup.country_for(&other.to_string()),
            None => {
                return Err(NormalizationError {
                    field: WEBSITE_FIELD,
                    index,
                })
            },
        };

        impression.insert(TIMESTAMP_FIELD, timestamp);
        impression.insert(COUNTRY_FIELD, country);
        normalized.push(impression);
    }

    Ok(normalized)
}
