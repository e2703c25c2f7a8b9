//! Error types for the correlation pipeline
//!
//! Each stage has its own error type so the driver can report which stage
//! failed and why. [`PipelineError`] unifies them at the driver boundary.

use thiserror::Error;

use crate::source::SourceFormat;

/// Failure while opening or decoding a record source
#[derive(Error, Debug)]
#[error("{format} ingestion failed for {path}: {kind}")]
pub struct IngestionError {
    pub format: SourceFormat,
    pub path: String,
    pub kind: IngestionErrorKind,
}

impl IngestionError {
    pub fn new(format: SourceFormat, path: &std::path::Path, kind: IngestionErrorKind) -> Self {
        Self {
            format,
            path: path.display().to_string(),
            kind,
        }
    }

    /// Whether only a single record is affected and the stream can continue
    pub fn is_record_level(&self) -> bool {
        self.kind.position().is_some()
    }
}

/// Underlying cause of an [`IngestionError`]
///
/// Positions are 1-based: line numbers for JSON Lines, data row numbers for
/// CSV (header excluded), record ordinals for Avro.
#[derive(Error, Debug)]
pub enum IngestionErrorKind {
    #[error("cannot open file: {0}")]
    Open(#[source] std::io::Error),

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("invalid CSV header: {0}")]
    CsvHeader(#[source] csv::Error),

    #[error("invalid Avro container: {0}")]
    AvroContainer(#[source] apache_avro::Error),

    #[error("invalid JSON on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line} is not valid UTF-8")]
    InvalidUtf8 { line: usize },

    #[error("line {line} is a JSON {found}, expected an object")]
    NotAnObject { line: usize, found: &'static str },

    #[error("invalid CSV row {row}: {source}")]
    Csv {
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("invalid Avro record {record}: {source}")]
    Avro {
        record: usize,
        #[source]
        source: apache_avro::Error,
    },

    #[error("Avro record {record} is not a record value ({found})")]
    NotARecord { record: usize, found: String },

    #[error("cancelled")]
    Cancelled,
}

impl IngestionErrorKind {
    /// Position of the offending record, for per-record decode failures
    pub fn position(&self) -> Option<usize> {
        match self {
            IngestionErrorKind::Json { line, .. }
            | IngestionErrorKind::InvalidUtf8 { line }
            | IngestionErrorKind::NotAnObject { line, .. } => Some(*line),
            IngestionErrorKind::Csv { row, .. } => Some(*row),
            IngestionErrorKind::Avro { record, .. } | IngestionErrorKind::NotARecord { record, .. } => {
                Some(*record)
            },
            _ => None,
        }
    }
}

/// An impression lacks a field the normalizer needs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("impression at index {index} is missing required field '{field}'")]
pub struct NormalizationError {
    pub field: &'static str,
    pub index: usize,
}

/// A click/conversion record lacks the field the filter predicate reads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("click/conversion record at index {index} is missing required field '{field}': {record}")]
pub struct FilterError {
    pub field: String,
    pub index: usize,
    /// JSON rendering of the offending record
    pub record: String,
}

/// Which join input a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Impression,
    ClickConversion,
}

impl std::fmt::Display for JoinSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinSide::Impression => write!(f, "impression"),
            JoinSide::ClickConversion => write!(f, "click/conversion record"),
        }
    }
}

/// A join input lacks a field the correlator needs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{side} at index {index} is missing required field '{field}'")]
pub struct CorrelationError {
    pub side: JoinSide,
    pub field: &'static str,
    pub index: usize,
}

/// Failure writing to an event sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure delivering an alert
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Network request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notifier endpoint answered {0}")]
    Status(reqwest::StatusCode),
}

/// Any stage failure, as seen by the pipeline driver
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("stage exceeded its {secs}s deadline")]
    Timeout { secs: u64 },

    #[error("run cancelled")]
    Cancelled,

    #[error("stage task failed: {0}")]
    Task(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_ingestion_error_message_names_format_and_path() {
        let err = IngestionError::new(
            SourceFormat::JsonLines,
            Path::new("ad_impressions.json"),
            IngestionErrorKind::NotAnObject {
                line: 3,
                found: "array",
            },
        );
        assert_eq!(
            err.to_string(),
            "JSON Lines ingestion failed for ad_impressions.json: line 3 is a JSON array, expected an object"
        );
        assert!(err.is_record_level());
    }

    #[test]
    fn test_open_failure_is_not_record_level() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = IngestionError::new(SourceFormat::Csv, Path::new("x.csv"), IngestionErrorKind::Open(io));
        assert!(!err.is_record_level());
        assert_eq!(err.kind.position(), None);
    }

    #[test]
    fn test_correlation_error_message() {
        let err = CorrelationError {
            side: JoinSide::ClickConversion,
            field: "user_id",
            index: 4,
        };
        assert_eq!(
            err.to_string(),
            "click/conversion record at index 4 is missing required field 'user_id'"
        );
    }
}
