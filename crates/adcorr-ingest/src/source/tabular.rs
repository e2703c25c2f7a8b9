//! CSV source: header row names the fields of every following row

use adcorr_common::{FieldValue, RawRecord};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::{RecordSource, RecordStream, SourceFormat};
use crate::error::{IngestionError, IngestionErrorKind};

/// Reads delimited text with a header row; every value is text
///
/// A row whose length differs from the header is a per-record failure.
#[derive(Debug, Clone, Copy)]
pub struct CsvSource {
    delimiter: u8,
}

impl CsvSource {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Default for CsvSource {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl RecordSource for CsvSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }

    fn open(&self, path: &Path) -> Result<RecordStream, IngestionError> {
        let file = File::open(path)
            .map_err(|e| IngestionError::new(self.format(), path, IngestionErrorKind::Open(e)))?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| IngestionError::new(self.format(), path, IngestionErrorKind::CsvHeader(e)))?
            .iter()
            .map(str::to_string)
            .collect();

        let path: PathBuf = path.to_path_buf();
        let stream = reader.into_records().enumerate().map(move |(idx, row)| {
            let row = row.map_err(|source| {
                IngestionError::new(
                    SourceFormat::Csv,
                    &path,
                    IngestionErrorKind::Csv { row: idx + 1, source },
                )
            })?;

            Ok(headers
                .iter()
                .zip(row.iter())
                .map(|(name, value)| (name.clone(), FieldValue::from(value)))
                .collect::<RawRecord>())
        });

        Ok(Box::new(stream))
    }
}
