//! Index discovery: checkpoint trust, recycled-data guard, failing types

use super::support::{config, doc_type, entries, MockFetcher, MockIndex};
use index_harvester::harvester::HarvestEngine;
use index_harvester::resume::{Checkpoint, CheckpointStore};
use index_harvester::shutdown::InterruptCoordinator;
use std::sync::Arc;
use tempfile::TempDir;

/// Checkpoint as a blind pagination with 100-entry pages leaves it
fn seed_checkpoint(path: std::path::PathBuf, name: &str, prefix: &str, count: u64) {
    let mut checkpoint = Checkpoint::new();
    checkpoint.restart(&doc_type(name), 100);
    checkpoint.extend(&doc_type(name), entries(name, prefix, count));
    CheckpointStore::new(path).save(&checkpoint).unwrap();
}

#[tokio::test]
async fn test_recycled_data_guard_stops_blind_pagination() {
    let dir = TempDir::new().unwrap();
    // 250 real entries; offsets past the end replay the first page
    let index = MockIndex::new().with_type("bill", "B", 250).recycling();
    let cfg = config(dir.path(), &["bill"]);
    let engine = HarvestEngine::new(cfg).unwrap();

    let summary = engine
        .run(&index, MockFetcher::ok(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(summary.discovered, 250);
    assert!(summary.discovery_complete);
    assert!(summary.discovery[0].outcome.contains("recycled"));
    // Pages at 1, 101, 201, then the recycled page at 301
    assert_eq!(index.page_calls("bill"), 4);
    assert_eq!(summary.outcomes.done, 250);
}

#[tokio::test]
async fn test_trusted_checkpoint_skips_pagination() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill", "motion"]);
    seed_checkpoint(cfg.checkpoint_path(), "bill", "B", 150);

    let index = MockIndex::new().with_type("bill", "B", 400).with_type("motion", "M", 5);
    let engine = HarvestEngine::new(cfg.clone()).unwrap();
    let summary = engine
        .run(&index, MockFetcher::ok(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(index.page_calls("bill"), 0);
    assert!(index.page_calls("motion") > 0);
    assert!(summary.discovery[0].from_checkpoint);
    assert_eq!(summary.discovery[0].entries, 150);
    assert_eq!(summary.discovered, 155);
    assert!(!cfg.checkpoint_path().exists());
}

#[tokio::test]
async fn test_page_sized_checkpoint_is_repaginated() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill"]);
    // Exactly one page: indistinguishable from a run killed after page one
    seed_checkpoint(cfg.checkpoint_path(), "bill", "B", 100);

    let index = MockIndex::new().with_type("bill", "B", 130);
    let engine = HarvestEngine::new(cfg).unwrap();
    let summary = engine
        .run(&index, MockFetcher::ok(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert!(!summary.discovery[0].from_checkpoint);
    assert_eq!(index.page_calls("bill"), 3);
    assert_eq!(summary.discovered, 130);
    assert_eq!(summary.work_set, 130);
}

#[tokio::test]
async fn test_checkpoint_reaching_index_limit_is_trusted() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill"]).with_index_limit(50);
    seed_checkpoint(cfg.checkpoint_path(), "bill", "B", 50);

    let index = MockIndex::new().with_type("bill", "B", 300);
    let summary = HarvestEngine::new(cfg)
        .unwrap()
        .run(&index, MockFetcher::ok(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(index.page_calls("bill"), 0);
    assert_eq!(summary.work_set, 50);
}

#[tokio::test]
async fn test_trusted_checkpoint_is_capped_at_index_limit() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill"]).with_index_limit(50);
    seed_checkpoint(cfg.checkpoint_path(), "bill", "B", 300);

    let index = MockIndex::new().with_type("bill", "B", 300);
    let fetcher = Arc::new(MockFetcher::ok());
    let summary = HarvestEngine::new(cfg)
        .unwrap()
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(index.page_calls("bill"), 0);
    assert!(summary.discovery[0].from_checkpoint);
    assert_eq!(summary.discovery[0].entries, 50);
    assert_eq!(summary.discovered, 50);
    assert_eq!(summary.work_set, 50);
    assert!(fetcher
        .fetched_ids()
        .iter()
        .all(|id| id.ordinal().unwrap() <= 50));
}

#[tokio::test]
async fn test_one_known_page_larger_than_page_size_is_repaginated() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill"]);
    let interrupt = InterruptCoordinator::shared();
    // Two published pages of 500, five times the configured page size
    let index = MockIndex::new()
        .with_type("bill", "B", 1000)
        .with_boundaries("bill", 500, 2)
        .interrupt_on_call(1, interrupt.clone());
    let engine = HarvestEngine::new(cfg.clone()).unwrap();

    let first = engine
        .run(&index, MockFetcher::ok(), interrupt)
        .await
        .unwrap();
    assert!(first.interrupted);
    assert_eq!(first.discovered, 500);
    let checkpoint = CheckpointStore::new(cfg.checkpoint_path()).load();
    assert_eq!(checkpoint.first_page_size(&doc_type("bill")), Some(500));

    let second = engine
        .run(&index, MockFetcher::ok(), InterruptCoordinator::shared())
        .await
        .unwrap();
    assert!(!second.discovery[0].from_checkpoint);
    assert!(second.discovery_complete);
    assert_eq!(second.discovered, 1000);
    assert_eq!(second.outcomes.done, 1000);
    assert_eq!(index.page_calls("bill"), 3);
    assert!(!cfg.checkpoint_path().exists());
}

#[tokio::test]
async fn test_index_limit_truncates_pagination() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill"])
        .with_index_limit(120)
        .with_page_size(50);

    let index = MockIndex::new().with_type("bill", "B", 1000);
    let summary = HarvestEngine::new(cfg)
        .unwrap()
        .run(&index, MockFetcher::ok(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(summary.discovered, 120);
    assert_eq!(index.page_calls("bill"), 3);
    assert_eq!(summary.discovery[0].outcome, "limit reached");
}

#[tokio::test]
async fn test_interrupt_during_page_retries_skips_fetch_phase() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill", "motion"]);
    let interrupt = InterruptCoordinator::shared();
    // Bill takes calls 1 and 2; the first motion call times out and interrupts
    let index = MockIndex::new()
        .with_type("bill", "B", 30)
        .timing_out("motion")
        .interrupt_on_call(3, interrupt.clone());

    let fetcher = Arc::new(MockFetcher::ok());
    let summary = HarvestEngine::new(cfg.clone())
        .unwrap()
        .run_shared(&index, fetcher.clone(), interrupt)
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert!(!summary.discovery_complete);
    assert_eq!(summary.discovery[1].outcome, "interrupted");
    assert_eq!(index.page_calls("motion"), 1);
    assert_eq!(summary.work_set, 0);
    assert_eq!(fetcher.attempts(), 0);
    assert!(cfg.checkpoint_path().exists());
}

#[tokio::test]
async fn test_failing_type_keeps_checkpoint_but_harvests_the_rest() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill", "motion"]);
    let index = MockIndex::new().with_type("bill", "B", 30).failing("motion");

    let fetcher = Arc::new(MockFetcher::ok());
    let summary = HarvestEngine::new(cfg.clone())
        .unwrap()
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert!(!summary.discovery_complete);
    assert!(summary.discovery[1].outcome.starts_with("failed"));
    assert_eq!(summary.outcomes.done, 30);
    assert!(!summary.completed_all());

    let checkpoint = CheckpointStore::new(cfg.checkpoint_path()).load();
    assert_eq!(checkpoint.entry_count(&doc_type("bill")), 30);
    assert_eq!(checkpoint.entry_count(&doc_type("motion")), 0);
}
