//! Pipeline configuration
//!
//! Sources, lowest precedence first: defaults, a TOML file, `ADCORR_*`
//! environment variables, then command-line flags (applied by the binary).

use adcorr_common::{AdcorrError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::filter::{ConversionFilter, DEFAULT_CONVERSION_TYPE};
use crate::normalize::{CountryLookup, FixedCountry, TableLookup, DEFAULT_COUNTRY};
use crate::source::DecodePolicy;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_JSON_PATH: &str = "ad_impressions.json";
pub const DEFAULT_CSV_PATH: &str = "clicks_conversions.csv";
pub const DEFAULT_AVRO_PATH: &str = "bid_requests.avro";
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_NOTIFIER_TIMEOUT_SECS: u64 = 10;

/// What the driver does after a stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run; nothing is emitted
    #[default]
    Abort,
    /// Hand dependent stages an empty collection and keep going
    Continue,
}

impl std::str::FromStr for FailurePolicy {
    type Err = AdcorrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "continue" => Ok(FailurePolicy::Continue),
            _ => Err(AdcorrError::config(format!("Invalid failure policy: {}", s))),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Impressions, JSON Lines
    pub json_path: PathBuf,

    /// Clicks and conversions, CSV
    pub csv_path: PathBuf,

    /// Bid requests, Avro
    pub avro_path: PathBuf,

    /// Webhook receiving failure alerts; alerts are only logged when unset
    pub notifier_endpoint: Option<String>,

    /// `conversion_type` value that passes the filter
    pub conversion_type: String,

    /// Country for websites missing from `country_table`
    pub default_country: String,

    /// Website to country code
    pub country_table: HashMap<String, String>,

    pub decode_policy: DecodePolicy,

    pub on_stage_failure: FailurePolicy,

    /// Deadline for each stage
    pub stage_timeout_secs: u64,

    pub notifier_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            json_path: PathBuf::from(DEFAULT_JSON_PATH),
            csv_path: PathBuf::from(DEFAULT_CSV_PATH),
            avro_path: PathBuf::from(DEFAULT_AVRO_PATH),
            notifier_endpoint: None,
            conversion_type: DEFAULT_CONVERSION_TYPE.to_string(),
            default_country: DEFAULT_COUNTRY.to_string(),
            country_table: HashMap::new(),
            decode_policy: DecodePolicy::default(),
            on_stage_failure: FailurePolicy::default(),
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            notifier_timeout_secs: DEFAULT_NOTIFIER_TIMEOUT_SECS,
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| AdcorrError::config(format!("Invalid config file: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Apply `ADCORR_*` environment variables on top of `self`
    ///
    /// - `ADCORR_JSON_PATH`, `ADCORR_CSV_PATH`, `ADCORR_AVRO_PATH`
    /// - `ADCORR_NOTIFIER_ENDPOINT`
    /// - `ADCORR_CONVERSION_TYPE`, `ADCORR_DEFAULT_COUNTRY`
    /// - `ADCORR_DECODE_POLICY` (fail_fast, skip_invalid)
    /// - `ADCORR_ON_STAGE_FAILURE` (abort, continue)
    /// - `ADCORR_STAGE_TIMEOUT_SECS`, `ADCORR_NOTIFIER_TIMEOUT_SECS`
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = var("ADCORR_JSON_PATH") {
            self.json_path = PathBuf::from(path);
        }
        if let Some(path) = var("ADCORR_CSV_PATH") {
            self.csv_path = PathBuf::from(path);
        }
        if let Some(path) = var("ADCORR_AVRO_PATH") {
            self.avro_path = PathBuf::from(path);
        }
        if let Some(endpoint) = var("ADCORR_NOTIFIER_ENDPOINT") {
            self.notifier_endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }
        if let Some(value) = var("ADCORR_CONVERSION_TYPE") {
            self.conversion_type = value;
        }
        if let Some(value) = var("ADCORR_DEFAULT_COUNTRY") {
            self.default_country = value;
        }
        if let Some(value) = var("ADCORR_DECODE_POLICY") {
            self.decode_policy = value.parse().map_err(AdcorrError::Config)?;
        }
        if let Some(value) = var("ADCORR_ON_STAGE_FAILURE") {
            self.on_stage_failure = value.parse()?;
        }
        if let Some(value) = var("ADCORR_STAGE_TIMEOUT_SECS") {
            self.stage_timeout_secs = parse_secs("ADCORR_STAGE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = var("ADCORR_NOTIFIER_TIMEOUT_SECS") {
            self.notifier_timeout_secs = parse_secs("ADCORR_NOTIFIER_TIMEOUT_SECS", &value)?;
        }

        Ok(self)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("json_path", &self.json_path),
            ("csv_path", &self.csv_path),
            ("avro_path", &self.avro_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(AdcorrError::config(format!("{} must not be empty", name)));
            }
        }
        if self.conversion_type.is_empty() {
            return Err(AdcorrError::config("conversion_type must not be empty"));
        }
        if self.stage_timeout_secs == 0 || self.notifier_timeout_secs == 0 {
            return Err(AdcorrError::config("timeouts must be at least one second"));
        }
        self.notifier_url()?;
        Ok(())
    }

    /// Parsed notifier endpoint, if one is configured
    pub fn notifier_url(&self) -> Result<Option<Url>> {
        let Some(ref endpoint) = self.notifier_endpoint else {
            return Ok(None);
        };
        let url = Url::parse(endpoint)
            .map_err(|e| AdcorrError::config(format!("Invalid notifier endpoint '{}': {}", endpoint, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(Some(url)),
            other => Err(AdcorrError::config(format!(
                "Notifier endpoint must be http or https, got '{}'",
                other
            ))),
        }
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier_timeout_secs)
    }

    pub fn conversion_filter(&self) -> ConversionFilter {
        ConversionFilter::new(self.conversion_type.clone())
    }

    /// Table lookup when a table is configured, fixed country otherwise
    pub fn country_lookup(&self) -> Arc<dyn CountryLookup> {
        if self.country_table.is_empty() {
            Arc::new(FixedCountry::new(self.default_country.clone()))
        } else {
            Arc::new(TableLookup::new(self.country_table.clone(), self.default_country.clone()))
        }
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| AdcorrError::config(format!("{} must be a whole number of seconds, got '{}'", key, value)))
}
