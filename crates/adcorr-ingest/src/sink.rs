//! Output sinks for correlated events and dumped records

use adcorr_common::RawRecord;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Stdout, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::correlate::CorrelatedEvent;
use crate::error::SinkError;

/// Destination for pipeline output
pub trait EventSink: Send {
    fn emit(&mut self, event: &CorrelatedEvent) -> Result<(), SinkError>;

    /// Write a raw ingested record (used by `dump`)
    fn emit_record(&mut self, record: &RawRecord) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&mut self, event: &CorrelatedEvent) -> Result<(), SinkError> {
        (**self).emit(event)
    }

    fn emit_record(&mut self, record: &RawRecord) -> Result<(), SinkError> {
        (**self).emit_record(record)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Writes one compact JSON object per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

/// JSON lines on stdout
pub type ConsoleSink = JsonLinesSink<Stdout>;

/// JSON lines in a file
pub type FileSink = JsonLinesSink<BufWriter<File>>;

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line<T: Serialize>(&mut self, item: &T) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, item)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl FileSink {
    /// Create (or truncate) `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &CorrelatedEvent) -> Result<(), SinkError> {
        self.write_line(event)
    }

    fn emit_record(&mut self, record: &RawRecord) -> Result<(), SinkError> {
        self.write_line(record)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps everything in memory
///
/// Clones share the same storage, so a caller can hand one clone to the
/// pipeline and read the output through another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    collected: Arc<Mutex<Collected>>,
}

#[derive(Debug, Default)]
struct Collected {
    events: Vec<CorrelatedEvent>,
    records: Vec<RawRecord>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<CorrelatedEvent> {
        self.lock().events.clone()
    }

    pub fn records(&self) -> Vec<RawRecord> {
        self.lock().records.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Collected> {
        self.collected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &CorrelatedEvent) -> Result<(), SinkError> {
        self.lock().events.push(event.clone());
        Ok(())
    }

    fn emit_record(&mut self, record: &RawRecord) -> Result<(), SinkError> {
        self.lock().records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::correlate::Action;
    use adcorr_common::FieldValue;

    fn event(user: &str, action: Action) -> CorrelatedEvent {
        CorrelatedEvent {
            user_id: FieldValue::from(user),
            timestamp: FieldValue::from("2024-01-01T10:00:00"),
            action,
        }
    }

    #[test]
    fn test_json_lines_output() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit(&event("u1", Action::Conversion)).unwrap();
        sink.emit(&event("u2", Action::Click)).unwrap();
        sink.flush().unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            out,
            "{\"user_id\":\"u1\",\"timestamp\":\"2024-01-01T10:00:00\",\"action\":\"conversion\"}\n\
             {\"user_id\":\"u2\",\"timestamp\":\"2024-01-01T10:00:00\",\"action\":\"click\"}\n"
        );
    }

    #[test]
    fn test_file_sink_writes_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let mut sink = FileSink::create(&path).unwrap();
        sink.emit_record(&RawRecord::from_pairs([("request_id", "r1")])).unwrap();
        sink.flush().unwrap();
        drop(sink);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"request_id\":\"r1\"}\n");
    }

    #[test]
    fn test_memory_sink_clones_share_output() {
        let sink = MemorySink::default();
        let mut writer = sink.clone();
        writer.emit(&event("u1", Action::Click)).unwrap();
        assert_eq!(sink.events(), vec![event("u1", Action::Click)]);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_boxed_sink_forwards() {
        let sink = MemorySink::default();
        let mut boxed: Box<dyn EventSink> = Box::new(sink.clone());
        boxed.emit_record(&RawRecord::from_pairs([("request_id", "r1")])).unwrap();
        boxed.flush().unwrap();
        assert_eq!(sink.records().len(), 1);
    }
}
