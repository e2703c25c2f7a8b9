//! JSON Lines source: one self-describing object per line

use adcorr_common::RawRecord;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::{RecordSource, RecordStream, SourceFormat};
use crate::error::{IngestionError, IngestionErrorKind};

/// Reads newline-delimited JSON objects; blank lines are skipped
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesSource;

impl RecordSource for JsonLinesSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::JsonLines
    }

    fn open(&self, path: &Path) -> Result<RecordStream, IngestionError> {
        let file = File::open(path)
            .map_err(|e| IngestionError::new(self.format(), path, IngestionErrorKind::Open(e)))?;
        let path: PathBuf = path.to_path_buf();

        let stream = BufReader::new(file)
            .lines()
            .enumerate()
            .filter_map(move |(idx, line)| {
                let line_no = idx + 1;
                let line = match line {
                    Ok(line) => line,
                    // `lines()` has consumed the bad line; later lines are still readable
                    Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                        return Some(Err(fail(&path, IngestionErrorKind::InvalidUtf8 { line: line_no })));
                    },
                    Err(e) => return Some(Err(fail(&path, IngestionErrorKind::Read(e)))),
                };
                if line.trim().is_empty() {
                    return None;
                }
                Some(decode_line(&line, line_no).map_err(|kind| fail(&path, kind)))
            });

        Ok(Box::new(stream))
    }
}

fn fail(path: &Path, kind: IngestionErrorKind) -> IngestionError {
    IngestionError::new(SourceFormat::JsonLines, path, kind)
}

fn decode_line(line: &str, line_no: usize) -> Result<RawRecord, IngestionErrorKind> {
    let value: Value = serde_json::from_str(line).map_err(|source| IngestionErrorKind::Json {
        line: line_no,
        source,
    })?;

    match value {
        Value::Object(map) => Ok(RawRecord::from_json_object(map)),
        other => Err(IngestionErrorKind::NotAnObject {
            line: line_no,
            found: json_kind(&other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use adcorr_common::FieldValue;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_records_lazily_in_order() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"user_id":"u1","timestamp":"2024-01-01 10:00:00","website":"a.com"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"user_id":42,"timestamp":"2024-01-02 11:00:00","website":"b.de"}}"#).unwrap();

        let records: Vec<RawRecord> = JsonLinesSource
            .open(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("website"), Some(&FieldValue::from("a.com")));
        assert_eq!(records[1].get("user_id"), Some(&FieldValue::Int(42)));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"user_id":"u1"}}"#).unwrap();
        writeln!(file, r#"{{"user_id":"#).unwrap();

        let mut stream = JsonLinesSource.open(file.path()).unwrap();
        assert!(stream.next().unwrap().is_ok());
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err.kind, IngestionErrorKind::Json { line: 2, .. }));
    }

    #[test]
    fn test_invalid_utf8_line_is_a_record_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{\"user_id\":\"u1\"}\n{\"user_id\":\"\xff\xfe\"}\n{\"user_id\":\"u2\"}\n")
            .unwrap();

        let items: Vec<_> = JsonLinesSource.open(file.path()).unwrap().collect();
        assert_eq!(items.len(), 3);
        let err = items[1].as_ref().unwrap_err();
        assert!(matches!(err.kind, IngestionErrorKind::InvalidUtf8 { line: 2 }));
        assert!(err.is_record_level());
        assert!(items[2].is_ok());
    }

    #[test]
    fn test_non_object_line_is_rejected() {
        assert!(matches!(
            decode_line("\"just a string\"", 7),
            Err(IngestionErrorKind::NotAnObject { line: 7, found: "string" })
        ));
    }

    #[test]
    fn test_missing_file_fails_on_open() {
        let err = JsonLinesSource.open(Path::new("/nonexistent/x.json")).err().unwrap();
        assert!(matches!(err.kind, IngestionErrorKind::Open(_)));
    }
}
