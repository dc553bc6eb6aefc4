//! CLI command implementations

pub mod error;
pub mod harvest;
pub mod status;

pub use error::CliError;
pub use harvest::{Cli, Commands, OutputFormat, RunArgs};
pub use status::StatusCommand;
