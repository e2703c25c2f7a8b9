//! Record sources
//!
//! A [`RecordSource`] turns one file into a lazy stream of [`RawRecord`]s.
//! The stream owns the file handle, so the handle is released when the
//! stream is dropped: after the last record, on early abandonment, or after
//! an error.
//!
//! | Format       | Source              | Feeds              |
//! |--------------|---------------------|--------------------|
//! | JSON Lines   | [`JsonLinesSource`] | impressions        |
//! | CSV          | [`CsvSource`]       | clicks/conversions |
//! | Avro         | [`AvroSource`]      | bid requests       |

mod avro;
mod jsonl;
mod tabular;

pub use avro::AvroSource;
pub use jsonl::JsonLinesSource;
pub use tabular::CsvSource;

use adcorr_common::RawRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{IngestionError, IngestionErrorKind};

/// Lazy sequence of decoded records
pub type RecordStream = Box<dyn Iterator<Item = Result<RawRecord, IngestionError>>>;

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    JsonLines,
    Csv,
    Avro,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::JsonLines => write!(f, "JSON Lines"),
            SourceFormat::Csv => write!(f, "CSV"),
            SourceFormat::Avro => write!(f, "Avro"),
        }
    }
}

/// Decodes one file format into records
pub trait RecordSource: Send + Sync {
    fn format(&self) -> SourceFormat;

    /// Open `path` and return a lazy record stream
    ///
    /// Fails if the file cannot be opened or its header/schema is unreadable.
    /// Per-record failures surface as `Err` items in the stream.
    fn open(&self, path: &Path) -> Result<RecordStream, IngestionError>;
}

/// Default source implementation for a format
pub fn source_for(format: SourceFormat) -> Arc<dyn RecordSource> {
    match format {
        SourceFormat::JsonLines => Arc::new(JsonLinesSource),
        SourceFormat::Csv => Arc::new(CsvSource::default()),
        SourceFormat::Avro => Arc::new(AvroSource),
    }
}

/// What to do with a record that fails to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// First bad record fails the whole source
    #[default]
    FailFast,
    /// Bad records are logged and skipped; open failures still fail
    SkipInvalid,
}

impl std::str::FromStr for DecodePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail_fast" | "fail-fast" => Ok(DecodePolicy::FailFast),
            "skip_invalid" | "skip-invalid" | "skip" => Ok(DecodePolicy::SkipInvalid),
            _ => Err(format!("Invalid decode policy: {}", s)),
        }
    }
}

/// Drain a source into memory
///
/// Checks `cancel` between records; a cancelled read fails with
/// [`IngestionErrorKind::Cancelled`].
pub fn read_all(
    source: &dyn RecordSource,
    path: &Path,
    policy: DecodePolicy,
    cancel: &CancellationToken,
) -> Result<Vec<RawRecord>, IngestionError> {
    let format = source.format();
    let stream = source.open(path)?;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for item in stream {
        if cancel.is_cancelled() {
            return Err(IngestionError::new(format, path, IngestionErrorKind::Cancelled));
        }

        match item {
            Ok(record) => records.push(record),
            Err(err) if policy == DecodePolicy::SkipInvalid && err.is_record_level() => {
                warn!(format = %format, path = %path.display(), error = %err, "Skipping invalid record");
                skipped += 1;
            },
            Err(err) => return Err(err),
        }
    }

    debug!(
        format = %format,
        path = %path.display(),
        records = records.len(),
        skipped,
        "Source drained"
    );
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn jsonl_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_fail_fast_stops_at_first_bad_record() {
        let file = jsonl_file("{\"user_id\":\"u1\"}\nnot json\n{\"user_id\":\"u2\"}\n");
        let err = read_all(&JsonLinesSource, file.path(), DecodePolicy::FailFast, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.format, SourceFormat::JsonLines);
        assert_eq!(err.kind.position(), Some(2));
    }

    #[test]
    fn test_skip_invalid_keeps_good_records() {
        let file = jsonl_file("{\"user_id\":\"u1\"}\nnot json\n[1,2]\n{\"user_id\":\"u2\"}\n");
        let records =
            read_all(&JsonLinesSource, file.path(), DecodePolicy::SkipInvalid, &CancellationToken::new())
                .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_skip_invalid_skips_lines_with_bad_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{\"user_id\":\"u1\"}\n{\"user_id\":\"\xff\xfe\"}\n{\"user_id\":\"u2\"}\n")
            .unwrap();

        let records =
            read_all(&JsonLinesSource, file.path(), DecodePolicy::SkipInvalid, &CancellationToken::new())
                .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("user_id"), Some(&adcorr_common::FieldValue::from("u2")));

        let err = read_all(&JsonLinesSource, file.path(), DecodePolicy::FailFast, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.kind.position(), Some(2));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_skip_invalid_still_fails_on_missing_file() {
        let err = read_all(
            &JsonLinesSource,
            Path::new("/nonexistent/ad_impressions.json"),
            DecodePolicy::SkipInvalid,
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err.kind, IngestionErrorKind::Open(_)));
    }

    #[test]
    fn test_cancelled_read_fails() {
        let file = jsonl_file("{\"user_id\":\"u1\"}\n");
        let token = CancellationToken::new();
        token.cancel();
        let err = read_all(&JsonLinesSource, file.path(), DecodePolicy::FailFast, &token).unwrap_err();
        assert!(matches!(err.kind, IngestionErrorKind::Cancelled));
    }

    #[test]
    fn test_decode_policy_from_str() {
        assert_eq!("skip".parse::<DecodePolicy>().unwrap(), DecodePolicy::SkipInvalid);
        assert_eq!("fail-fast".parse::<DecodePolicy>().unwrap(), DecodePolicy::FailFast);
        assert!("retry".parse::<DecodePolicy>().is_err());
    }

    #[test]
    fn test_source_for_matches_format() {
        for format in [SourceFormat::JsonLines, SourceFormat::Csv, SourceFormat::Avro] {
            assert_eq!(source_for(format).format(), format);
        }
    }
}
