//! Pipeline driver
//!
//! Runs ingest → normalize → filter → correlate → emit. The three sources
//! are independent, so they are read concurrently on the blocking pool and
//! joined before anything else starts. Every later stage runs alone.
//!
//! Emission also runs on the blocking pool, so a stalled sink (a full
//! stdout pipe, a hung disk) is bounded by the stage deadline like every
//! other stage. The sink is therefore passed by value.
//!
//! Each stage returns a `Result`. [`Pipeline::settle`] is the single place
//! where failures are logged, forwarded to the notifier and recorded in the
//! [`RunReport`]; the configured [`FailurePolicy`] then decides whether the
//! run stops or continues with empty input.

use adcorr_common::RawRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{FailurePolicy, PipelineConfig};
use crate::correlate::{correlate, CorrelatedEvent};
use crate::error::PipelineError;
use crate::filter::{filter_dedup, ConversionFilter};
use crate::normalize::{normalize, CountryLookup};
use crate::notify::Notifier;
use crate::sink::EventSink;
use crate::source::{read_all, source_for, RecordSource, SourceFormat};

pub const ALERT_SUBJECT: &str = "Error in data processing";

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    IngestImpressions,
    IngestClicksConversions,
    IngestBidRequests,
    Normalize,
    Filter,
    Correlate,
    Emit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::IngestImpressions => "ingest_impressions",
            Stage::IngestClicksConversions => "ingest_clicks_conversions",
            Stage::IngestBidRequests => "ingest_bid_requests",
            Stage::Normalize => "normalize",
            Stage::Filter => "filter",
            Stage::Correlate => "correlate",
            Stage::Emit => "emit",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Stage::IngestImpressions => "ingesting impressions",
            Stage::IngestClicksConversions => "ingesting clicks and conversions",
            Stage::IngestBidRequests => "ingesting bid requests",
            Stage::Normalize => "processing ad impressions",
            Stage::Filter => "processing clicks and conversions",
            Stage::Correlate => "correlating data",
            Stage::Emit => "emitting correlated events",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stage that did not produce output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub impressions: usize,
    pub clicks_conversions: usize,
    pub bid_requests: usize,
    /// Click/conversion records left after filter and dedup
    pub retained: usize,
    /// Events or records written to the sink
    pub emitted: usize,
    pub failures: Vec<StageFailure>,
    /// Set when the failure policy stopped the run early
    pub aborted: bool,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            impressions: 0,
            clicks_conversions: 0,
            bid_requests: 0,
            retained: 0,
            emitted: 0,
            failures: Vec::new(),
            aborted: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, stage: Stage) -> bool {
        self.failures.iter().any(|f| f.stage == stage)
    }
}

/// The correlation pipeline
pub struct Pipeline {
    config: PipelineConfig,
    lookup: Arc<dyn CountryLookup>,
    filter: ConversionFilter,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            lookup: config.country_lookup(),
            filter: config.conversion_filter(),
            config,
            notifier,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the current run
    ///
    /// Cancelling fails the running stage with [`PipelineError::Cancelled`]
    /// and signals in-flight reads and writes to stop at their next record.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the full pipeline, writing correlated events to `sink`
    #[instrument(name = "pipeline_run", skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run<S>(&self, sink: S) -> RunReport
    where
        S: EventSink + 'static,
    {
        let mut report = RunReport::new(Uuid::new_v4());
        tracing::Span::current().record("run_id", tracing::field::display(report.run_id));

        let (impressions, clicks, bids) = self.ingest_all().await;
        let impressions = self.settle(&mut report, Stage::IngestImpressions, impressions).await;
        let clicks = self.settle(&mut report, Stage::IngestClicksConversions, clicks).await;
        let bids = self.settle(&mut report, Stage::IngestBidRequests, bids).await;
        if self.should_abort(&mut report) {
            return report;
        }

        let impressions = impressions.unwrap_or_default();
        let clicks = clicks.unwrap_or_default();
        report.impressions = impressions.len();
        report.clicks_conversions = clicks.len();
        report.bid_requests = bids.map_or(0, |b| b.len());
        info!(
            impressions = report.impressions,
            clicks_conversions = report.clicks_conversions,
            bid_requests = report.bid_requests,
            "Ingestion complete"
        );

        let lookup = Arc::clone(&self.lookup);
        let normalized = self
            .blocking(Stage::Normalize, move |_| Ok(normalize(impressions, lookup.as_ref())?))
            .await;
        let normalized = self.settle(&mut report, Stage::Normalize, normalized).await;
        if self.should_abort(&mut report) {
            return report;
        }

        let filter = self.filter.clone();
        let retained = self
            .blocking(Stage::Filter, move |_| Ok(filter_dedup(clicks, &filter)?))
            .await;
        let retained = self.settle(&mut report, Stage::Filter, retained).await;
        if self.should_abort(&mut report) {
            return report;
        }

        let normalized = normalized.unwrap_or_default();
        let retained = retained.unwrap_or_default();
        report.retained = retained.len();
        info!(normalized = normalized.len(), retained = report.retained, "Transform stages complete");

        let events = self
            .blocking(Stage::Correlate, move |_| Ok(correlate(&normalized, &retained)?))
            .await;
        let events = self.settle(&mut report, Stage::Correlate, events).await;
        if self.should_abort(&mut report) {
            return report;
        }

        let events = events.unwrap_or_default();
        let correlated = events.len();
        let emitted = self
            .blocking(Stage::Emit, move |cancel| emit_events(sink, &events, &cancel))
            .await;
        if let Some(count) = self.settle(&mut report, Stage::Emit, emitted).await {
            report.emitted = count;
        }

        info!(
            correlated,
            emitted = report.emitted,
            failures = report.failures.len(),
            "Pipeline run finished"
        );
        report
    }

    /// Ingest all three sources and write every raw record to `sink`
    #[instrument(name = "pipeline_dump", skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn dump<S>(&self, sink: S) -> RunReport
    where
        S: EventSink + 'static,
    {
        let mut report = RunReport::new(Uuid::new_v4());
        tracing::Span::current().record("run_id", tracing::field::display(report.run_id));

        let (impressions, clicks, bids) = self.ingest_all().await;
        let impressions = self.settle(&mut report, Stage::IngestImpressions, impressions).await;
        let clicks = self.settle(&mut report, Stage::IngestClicksConversions, clicks).await;
        let bids = self.settle(&mut report, Stage::IngestBidRequests, bids).await;
        if self.should_abort(&mut report) {
            return report;
        }

        let batches = [
            impressions.unwrap_or_default(),
            clicks.unwrap_or_default(),
            bids.unwrap_or_default(),
        ];
        report.impressions = batches[0].len();
        report.clicks_conversions = batches[1].len();
        report.bid_requests = batches[2].len();

        let emitted = self
            .blocking(Stage::Emit, move |cancel| emit_records(sink, batches.iter().flatten(), &cancel))
            .await;
        if let Some(count) = self.settle(&mut report, Stage::Emit, emitted).await {
            report.emitted = count;
        }

        info!(emitted = report.emitted, failures = report.failures.len(), "Dump finished");
        report
    }

    /// Read the three sources concurrently; returns once all have finished
    async fn ingest_all(
        &self,
    ) -> (
        Result<Vec<RawRecord>, PipelineError>,
        Result<Vec<RawRecord>, PipelineError>,
        Result<Vec<RawRecord>, PipelineError>,
    ) {
        tokio::join!(
            self.ingest(Stage::IngestImpressions, SourceFormat::JsonLines, &self.config.json_path),
            self.ingest(Stage::IngestClicksConversions, SourceFormat::Csv, &self.config.csv_path),
            self.ingest(Stage::IngestBidRequests, SourceFormat::Avro, &self.config.avro_path),
        )
    }

    async fn ingest(
        &self,
        stage: Stage,
        format: SourceFormat,
        path: &Path,
    ) -> Result<Vec<RawRecord>, PipelineError> {
        let source: Arc<dyn RecordSource> = source_for(format);
        let path: PathBuf = path.to_path_buf();
        let policy = self.config.decode_policy;

        self.blocking(stage, move |cancel| Ok(read_all(source.as_ref(), &path, policy, &cancel)?))
            .await
    }

    /// Run `work` on the blocking pool under the stage deadline
    ///
    /// `work` receives a child of the pipeline token. It is triggered when the
    /// deadline expires, so cooperative work stops at its next check and the
    /// stage fails with a timeout. Cancelling the pipeline fails the stage
    /// with [`PipelineError::Cancelled`].
    async fn blocking<T, F>(&self, stage: Stage, work: F) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, PipelineError> + Send + 'static,
    {
        let deadline = self.config.stage_timeout();
        let cancel = self.cancel.child_token();
        let handle = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || work(cancel)
        });

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled),
            outcome = tokio::time::timeout(deadline, handle) => match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(PipelineError::Task(format!("{} task panicked: {}", stage, join_err))),
                Err(_) => {
                    cancel.cancel();
                    Err(PipelineError::Timeout {
                        secs: deadline.as_secs(),
                    })
                },
            },
        }
    }

    /// The error boundary: log, notify and record a failed stage
    async fn settle<T>(
        &self,
        report: &mut RunReport,
        stage: Stage,
        result: Result<T, PipelineError>,
    ) -> Option<T> {
        let err = match result {
            Ok(value) => return Some(value),
            Err(err) => err,
        };

        let message = format!("Error {}: {}", stage.describe(), err);
        error!(stage = %stage, error = %err, "Stage failed");

        let body = format!("{}\n\nrun_id: {}", message, report.run_id);
        if let Err(notify_err) = self.notifier.notify(ALERT_SUBJECT, &body).await {
            warn!(stage = %stage, error = %notify_err, "Failed to deliver alert");
        }

        report.failures.push(StageFailure { stage, message });
        None
    }

    fn should_abort(&self, report: &mut RunReport) -> bool {
        if report.is_success() || self.config.on_stage_failure == FailurePolicy::Continue {
            return false;
        }
        warn!(failures = report.failures.len(), "Aborting run after stage failure");
        report.aborted = true;
        true
    }
}

fn emit_events<S: EventSink>(
    mut sink: S,
    events: &[CorrelatedEvent],
    cancel: &CancellationToken,
) -> Result<usize, PipelineError> {
    for event in events {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        sink.emit(event)?;
    }
    sink.flush()?;
    Ok(events.len())
}

fn emit_records<'a, S: EventSink>(
    mut sink: S,
    records: impl Iterator<Item = &'a RawRecord>,
    cancel: &CancellationToken,
) -> Result<usize, PipelineError> {
    let mut count = 0;
    for record in records {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        sink.emit_record(record)?;
        count += 1;
    }
    sink.flush()?;
    Ok(count)
}
