//! Unit tests for the run command flags

use clap::Parser;
use index_harvester::cli::{Cli, Commands, OutputFormat};
use std::time::Duration;

fn parse(extra: &[&str]) -> Cli {
    let mut args = vec![
        "index-harvester",
        "run",
        "--base-url",
        "https://index.test",
        "--types",
        "bill,motion",
    ];
    args.extend_from_slice(extra);
    Cli::parse_from(args)
}

#[test]
fn test_run_defaults_to_five_retries() {
    let cli = parse(&[]);
    let Commands::Run(run) = cli.command else {
        panic!("expected run");
    };
    assert_eq!(run.max_retries, 5, "Default max_retries should be 5");
    assert_eq!(run.types, vec!["bill", "motion"]);
    assert!(run.fetch_types.is_empty());
}

#[test]
fn test_run_flags_reach_the_config() {
    let cli = parse(&[
        "--limit",
        "100",
        "--workers",
        "8",
        "--throttle",
        "0.5",
        "--flush-interval",
        "40",
        "--fetch-types",
        "bill",
        "--verify",
    ]);
    let Commands::Run(ref run) = cli.command else {
        panic!("expected run");
    };
    let config = run.to_config(&cli.data_dir).unwrap();
    assert_eq!(config.limit, 100);
    assert_eq!(config.workers, 8);
    assert_eq!(config.throttle_interval, Duration::from_millis(500));
    assert_eq!(config.flush_interval, 40);
    assert_eq!(config.eligible_types.len(), 1);
    assert!(config.verify);
    assert!(config.validate().is_ok());
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = parse(&["--output-format", "json", "--data-dir", "/tmp/state"]);
    assert_eq!(cli.output_format, OutputFormat::Json);
    assert_eq!(cli.data_dir, std::path::PathBuf::from("/tmp/state"));
}

#[test]
fn test_worker_count_is_bounded() {
    let args = [
        "index-harvester",
        "run",
        "--base-url",
        "https://index.test",
        "--types",
        "bill",
        "--workers",
        "64",
    ];
    assert!(Cli::try_parse_from(args).is_err());
}

#[test]
fn test_status_subcommand() {
    let cli = Cli::parse_from(["index-harvester", "status", "--data-dir", "state"]);
    assert!(matches!(cli.command, Commands::Status(_)));
}
