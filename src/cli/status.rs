//! Status subcommand: inspect durable state without fetching anything

use super::harvest::{Cli, OutputFormat};
use super::CliError;
use crate::harvester::config::{CHECKPOINT_FILE, ITEM_CACHE_FILE, LEDGER_FILE};
use crate::resume::{CheckpointStore, ItemCache, ProgressLedger};
use crate::{ContentPolicy, NonEmptyContent, Sentinel};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Status command for inspecting the ledger, item cache and checkpoint
#[derive(Parser, Debug)]
pub struct StatusCommand {}

/// Counts read from a data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Ids recorded as done
    pub done: usize,
    /// Ids recorded as having no content
    pub no_content: usize,
    /// Ids skipped for size
    pub skipped_too_large: usize,
    /// Last ledger update (RFC 3339), if a ledger exists
    pub ledger_updated_at: Option<String>,
    /// Cached items with usable content
    pub cached_usable: usize,
    /// Cache entries that are no-content or skipped markers
    pub cached_markers: usize,
    /// Cache entries that are neither usable nor markers
    pub cached_empty: usize,
    /// Checkpointed entries per document type, if discovery is unfinished
    pub checkpoint: BTreeMap<String, usize>,
}

impl StatusReport {
    /// Read the state files under `data_dir`
    pub fn collect(data_dir: &Path) -> Self {
        let ledger_path = data_dir.join(LEDGER_FILE);
        let ledger = ProgressLedger::load(&ledger_path);
        let cache = ItemCache::load(&data_dir.join(ITEM_CACHE_FILE));
        let checkpoint = CheckpointStore::new(data_dir.join(CHECKPOINT_FILE)).load();

        let policy = NonEmptyContent;
        let (mut usable, mut markers, mut empty) = (0, 0, 0);
        for (_, item) in cache.iter() {
            if policy.has_usable_content(item) {
                usable += 1;
            } else if matches!(item.sentinel(), Some(Sentinel::NoContent | Sentinel::Skipped)) {
                markers += 1;
            } else {
                empty += 1;
            }
        }

        Self {
            done: ledger.done().len(),
            no_content: ledger.no_content().len(),
            skipped_too_large: ledger.skipped_too_large().len(),
            ledger_updated_at: ledger_path
                .exists()
                .then(|| ledger.updated_at().to_rfc3339()),
            cached_usable: usable,
            cached_markers: markers,
            cached_empty: empty,
            checkpoint: checkpoint
                .types()
                .map(|t| (t.to_string(), checkpoint.entry_count(t)))
                .collect(),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Progress ledger")?;
        match &self.ledger_updated_at {
            Some(at) => writeln!(f, "  updated:           {at}")?,
            None => writeln!(f, "  (no ledger yet)")?,
        }
        writeln!(f, "  done:              {}", self.done)?;
        writeln!(f, "  no content:        {}", self.no_content)?;
        writeln!(f, "  skipped too large: {}", self.skipped_too_large)?;
        writeln!(f, "Item cache")?;
        writeln!(f, "  usable:            {}", self.cached_usable)?;
        writeln!(f, "  markers:           {}", self.cached_markers)?;
        if self.cached_empty > 0 {
            writeln!(f, "  empty:             {}", self.cached_empty)?;
        }
        if self.checkpoint.is_empty() {
            write!(f, "Checkpoint: none (last discovery finished)")
        } else {
            write!(f, "Checkpoint (discovery unfinished)")?;
            for (doc_type, count) in &self.checkpoint {
                write!(f, "\n  {doc_type:<18} {count}")?;
            }
            Ok(())
        }
    }
}

impl StatusCommand {
    /// Print the status of `cli.data_dir`
    pub fn execute(&self, cli: &Cli) -> Result<StatusReport, CliError> {
        if cli.data_dir.exists() && !cli.data_dir.is_dir() {
            return Err(CliError::InvalidArgument(format!(
                "{} is not a directory",
                cli.data_dir.display()
            )));
        }

        let report = StatusReport::collect(&cli.data_dir);
        match cli.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Human => println!("{report}"),
        }
        Ok(report)
    }
}
