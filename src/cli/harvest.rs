//! Harvest command implementation

use crate::fetcher::remote::{HttpIndexSource, HttpItemFetcher};
use crate::fetcher::retry::RetryPolicy;
use crate::harvester::config::{
    DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_ITEM_BYTES, DEFAULT_PAGE_SIZE, DEFAULT_WORKERS,
    MAX_RETRIES, MAX_WORKERS,
};
use crate::harvester::{HarvestConfig, HarvestEngine, HarvestSummary};
use crate::identifier::DocumentType;
use crate::shutdown::SharedInterrupt;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::CliError;

/// Parse and validate the worker count
fn parse_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS {
        return Err(format!("workers {value} exceeds maximum of {MAX_WORKERS}"));
    }
    Ok(value)
}

/// Parse a throttle interval in (fractional) seconds; `0` disables it
fn parse_throttle(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number of seconds"))?;
    if secs.is_sign_negative() {
        return Err("throttle interval cannot be negative".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid throttle interval: {e}"))
}

/// Parse a count that must be at least 1
fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("value must be at least 1".to_string()),
        Ok(v) => Ok(v),
        Err(_) => Err(format!("'{s}' is not a valid number")),
    }
}

/// Index Harvester CLI
#[derive(Parser, Debug)]
#[command(name = "index-harvester")]
#[command(about = "Incrementally harvest a paginated remote document index", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Directory holding checkpoint.json, ledger.json and items.json
    #[arg(long, global = true, default_value = "harvest")]
    pub data_dir: PathBuf,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover the index and fetch every entry not harvested yet
    Run(RunArgs),

    /// Show what earlier runs left on disk
    Status(super::StatusCommand),
}

/// Arguments for a harvest run
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Base URL of the index (listings at {base}/{type}?start=&size=)
    #[arg(long)]
    pub base_url: String,

    /// Document types to discover, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub types: Vec<String>,

    /// Document types whose entries are fetched (default: all discovered)
    #[arg(long, value_delimiter = ',')]
    pub fetch_types: Vec<String>,

    /// Maximum entries fetched this run (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Maximum entries discovered per type (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub index_limit: usize,

    /// Concurrent item fetches (max: 32)
    ///
    /// All workers share one throttle, so raising this only helps when
    /// individual fetches are slow compared to the throttle interval.
    #[arg(long, default_value_t = DEFAULT_WORKERS, value_parser = parse_workers)]
    pub workers: usize,

    /// Minimum seconds between request starts, process wide (0 = off)
    #[arg(long, default_value = "1", value_parser = parse_throttle)]
    pub throttle: Duration,

    /// Completions between durable writes of the cache and ledger
    #[arg(long, default_value_t = DEFAULT_FLUSH_INTERVAL, value_parser = parse_positive)]
    pub flush_interval: usize,

    /// Entries requested per index page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = parse_positive)]
    pub page_size: usize,

    /// Byte ceiling for a single item; larger items are skipped
    #[arg(long, default_value_t = DEFAULT_MAX_ITEM_BYTES)]
    pub max_bytes: u64,

    /// Retries for transient failures (range: 0-20)
    #[arg(long, default_value_t = MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Wipe the progress ledger and checkpoint before starting
    #[arg(long, default_value_t = false, conflicts_with = "verify")]
    pub reset: bool,

    /// Rebuild the progress ledger from the item cache instead of trusting it
    #[arg(long, default_value_t = false)]
    pub verify: bool,

    /// Disable the progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

impl RunArgs {
    /// Translate the flags into a harvest configuration
    pub fn to_config(&self, data_dir: &Path) -> Result<HarvestConfig, CliError> {
        let discover = parse_types(&self.types)?;
        if discover.is_empty() {
            return Err(CliError::InvalidArgument(
                "--types needs at least one document type".to_string(),
            ));
        }
        let eligible = parse_types(&self.fetch_types)?;

        let retry = RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        };

        Ok(HarvestConfig::new(data_dir)
            .with_discover_types(discover)
            .with_eligible_types(eligible)
            .with_limit(self.limit)
            .with_index_limit(self.index_limit)
            .with_workers(self.workers)
            .with_throttle_interval(self.throttle)
            .with_flush_interval(self.flush_interval)
            .with_page_size(self.page_size)
            .with_reset(self.reset)
            .with_verify(self.verify)
            .with_retry_policy(retry))
    }

    /// Execute one harvest run against the HTTP index at `base_url`
    pub async fn execute(
        &self,
        cli: &Cli,
        interrupt: SharedInterrupt,
    ) -> Result<HarvestSummary, CliError> {
        let config = self.to_config(&cli.data_dir)?;
        info!(
            base_url = %self.base_url,
            types = ?self.types,
            data_dir = %cli.data_dir.display(),
            "Starting harvest"
        );

        let mut engine = HarvestEngine::new(config)?;
        let show_bar = matches!(cli.output_format, OutputFormat::Human) && !self.no_progress;
        if show_bar {
            engine = engine.with_progress_bar(create_progress_bar());
        }

        let source = HttpIndexSource::new(self.base_url.as_str())?;
        let fetcher = HttpItemFetcher::new(self.max_bytes)?;
        let summary = engine.run(&source, fetcher, interrupt).await?;

        match cli.output_format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            OutputFormat::Human => {
                println!("\n{summary}");
            }
        }
        Ok(summary)
    }
}

fn parse_types(raw: &[String]) -> Result<Vec<DocumentType>, CliError> {
    let mut types: Vec<DocumentType> = Vec::with_capacity(raw.len());
    for value in raw.iter().filter(|v| !v.trim().is_empty()) {
        let parsed = DocumentType::parse(value)?;
        if !types.contains(&parsed) {
            types.push(parsed);
        }
    }
    Ok(types)
}

fn create_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}
