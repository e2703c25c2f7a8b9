//! adcorr Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests advertising events from three file formats and correlates
//! impressions with clicks and conversions.
//!
//! # Pipeline
//!
//! - **source**: JSON Lines impressions, CSV clicks/conversions, Avro bid requests
//! - **normalize**: ISO-8601 timestamps and country enrichment
//! - **filter**: conversion-type predicate and exact-duplicate removal
//! - **correlate**: hash join on `user_id`
//! - **pipeline**: the driver tying the stages together
//!
//! # Example
//!
//! ```no_run
//! use adcorr_ingest::config::PipelineConfig;
//! use adcorr_ingest::notify::LogNotifier;
//! use adcorr_ingest::pipeline::Pipeline;
//! use adcorr_ingest::sink::ConsoleSink;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::new(PipelineConfig::from_env()?, Arc::new(LogNotifier));
//!     let report = pipeline.run(ConsoleSink::stdout()).await;
//!     anyhow::ensure!(report.is_success(), "{} stage(s) failed", report.failures.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod correlate;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod sink;
pub mod source;

pub use config::{FailurePolicy, PipelineConfig};
pub use correlate::{correlate, Action, CorrelatedEvent};
pub use error::PipelineError;
pub use filter::{filter_dedup, ConversionFilter};
pub use normalize::{normalize, CountryLookup};
pub use pipeline::{Pipeline, RunReport, Stage};
