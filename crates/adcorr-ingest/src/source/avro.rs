//! Avro source: object container files carrying their own schema

use adcorr_common::{FieldValue, RawRecord};
use apache_avro::types::Value;
use apache_avro::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::{RecordSource, RecordStream, SourceFormat};
use crate::error::{IngestionError, IngestionErrorKind};

/// Reads records from an Avro object container file
///
/// Top-level values must be records. Scalars map onto [`FieldValue`]
/// directly; logical dates and timestamps keep their integer encoding;
/// arrays, maps and nested records become compact JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroSource;

impl RecordSource for AvroSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::Avro
    }

    fn open(&self, path: &Path) -> Result<RecordStream, IngestionError> {
        let file = File::open(path)
            .map_err(|e| IngestionError::new(self.format(), path, IngestionErrorKind::Open(e)))?;
        let reader = Reader::new(BufReader::new(file)).map_err(|e| {
            IngestionError::new(self.format(), path, IngestionErrorKind::AvroContainer(e))
        })?;

        let path: PathBuf = path.to_path_buf();
        let stream = reader.enumerate().map(move |(idx, value)| {
            let record = idx + 1;
            let value = value.map_err(|source| {
                IngestionError::new(
                    SourceFormat::Avro,
                    &path,
                    IngestionErrorKind::Avro { record, source },
                )
            })?;
            to_record(value, record).map_err(|kind| IngestionError::new(SourceFormat::Avro, &path, kind))
        });

        Ok(Box::new(stream))
    }
}

fn to_record(value: Value, record: usize) -> Result<RawRecord, IngestionErrorKind> {
    match value {
        Value::Record(fields) => Ok(fields
            .into_iter()
            .map(|(name, value)| (name, to_field(value)))
            .collect()),
        Value::Union(_, inner) => to_record(*inner, record),
        other => Err(IngestionErrorKind::NotARecord {
            record,
            found: format!("{:?}", other),
        }),
    }
}

fn to_field(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Boolean(b) => FieldValue::Bool(b),
        Value::Int(i) | Value::Date(i) | Value::TimeMillis(i) => FieldValue::Int(i64::from(i)),
        Value::Long(i) | Value::TimeMicros(i) | Value::TimestampMillis(i) | Value::TimestampMicros(i) => {
            FieldValue::Int(i)
        },
        Value::Float(x) => FieldValue::Float(f64::from(x)),
        Value::Double(x) => FieldValue::Float(x),
        Value::String(s) | Value::Enum(_, s) => FieldValue::Text(s),
        Value::Union(_, inner) => to_field(*inner),
        Value::Uuid(u) => FieldValue::Text(u.to_string()),
        other => match serde_json::Value::try_from(other.clone()) {
            Ok(json) => FieldValue::from(json),
            Err(_) => FieldValue::Text(format!("{:?}", other)),
        },
    }
}
