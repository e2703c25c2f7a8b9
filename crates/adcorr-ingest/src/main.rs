//! adcorr - advertising event correlation

use adcorr_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use adcorr_ingest::config::PipelineConfig;
use adcorr_ingest::notify::{LogNotifier, Notifier, WebhookNotifier};
use adcorr_ingest::pipeline::Pipeline;
use adcorr_ingest::sink::{ConsoleSink, EventSink, FileSink};
use adcorr_ingest::RunReport;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "adcorr")]
#[command(author, version, about = "Correlate ad impressions with clicks and conversions")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest, normalize, filter and correlate; emit correlated events
    Run {
        #[command(flatten)]
        inputs: InputArgs,

        /// Write events to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ingest all three sources and emit every raw record
    Dump {
        #[command(flatten)]
        inputs: InputArgs,

        /// Write records to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Impressions file (JSON Lines)
    #[arg(long)]
    json_path: Option<PathBuf>,

    /// Clicks/conversions file (CSV)
    #[arg(long)]
    csv_path: Option<PathBuf>,

    /// Bid requests file (Avro)
    #[arg(long)]
    avro_path: Option<PathBuf>,

    /// Webhook receiving failure alerts
    #[arg(long)]
    notifier_endpoint: Option<String>,
}

impl InputArgs {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(path) = self.json_path {
            config.json_path = path;
        }
        if let Some(path) = self.csv_path {
            config.csv_path = path;
        }
        if let Some(path) = self.avro_path {
            config.avro_path = path;
        }
        if let Some(endpoint) = self.notifier_endpoint {
            config.notifier_endpoint = Some(endpoint);
        }
    }
}

const EXIT_STAGE_FAILED: u8 = 1;
const EXIT_SETUP_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Both)
        .log_file_prefix("adcorr")
        .error_log("logs/data_processing.log")
        .build()
        .merge_env();

    let _guard = match log_config.and_then(|config| init_logging(&config)) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("adcorr: failed to initialize logging: {:#}", err);
            return ExitCode::from(EXIT_SETUP_FAILED);
        },
    };

    match execute(cli).await {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(report) => {
            error!(
                run_id = %report.run_id,
                failures = report.failures.len(),
                aborted = report.aborted,
                "Run finished with failures"
            );
            ExitCode::from(EXIT_STAGE_FAILED)
        },
        Err(err) => {
            error!(error = %format!("{:#}", err), "Setup failed");
            ExitCode::from(EXIT_SETUP_FAILED)
        },
    }
}

async fn execute(cli: Cli) -> Result<RunReport> {
    let mut config = match cli.config {
        Some(ref path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    }
    .merge_env()?;

    let (inputs, output, dump) = match cli.command {
        Command::Run { inputs, output } => (inputs, output, false),
        Command::Dump { inputs, output } => (inputs, output, true),
    };
    inputs.apply(&mut config);
    config.validate()?;

    let notifier: Arc<dyn Notifier> = match config.notifier_url()? {
        Some(url) => {
            let webhook = WebhookNotifier::new(url, config.notifier_timeout())?;
            info!(endpoint = %webhook.endpoint(), "Failure alerts go to webhook");
            Arc::new(webhook)
        },
        None => Arc::new(LogNotifier),
    };

    let sink: Box<dyn EventSink> = match output {
        Some(ref path) => Box::new(
            FileSink::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(ConsoleSink::stdout()),
    };

    info!(
        json_path = %config.json_path.display(),
        csv_path = %config.csv_path.display(),
        avro_path = %config.avro_path.display(),
        "Starting {}",
        if dump { "dump" } else { "correlation run" }
    );

    let pipeline = Pipeline::new(config, notifier);

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let report = if dump {
        pipeline.dump(sink).await
    } else {
        pipeline.run(sink).await
    };

    Ok(report)
}
