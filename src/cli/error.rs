//! CLI error types and conversions

use crate::fetcher::FetcherError;
use crate::harvester::HarvestError;
use crate::identifier::IdentifierError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Identifier error
    #[error("identifier error: {0}")]
    IdentifierError(#[from] IdentifierError),

    /// Harvest error
    #[error("harvest error: {0}")]
    HarvestError(#[from] HarvestError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Summary serialization failed
    #[error("output error: {0}")]
    OutputError(#[from] serde_json::Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
