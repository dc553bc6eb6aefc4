//! Startup reconciliation of the progress ledger against the item cache

use super::support::{config, entry_id, MockFetcher, MockIndex};
use index_harvester::harvester::HarvestEngine;
use index_harvester::resume::{ItemCache, LedgerClass, ProgressLedger};
use index_harvester::shutdown::InterruptCoordinator;
use index_harvester::Item;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_done_without_cached_content_is_demoted() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill"]);

    let mut cache = ItemCache::new();
    for n in 1..=3 {
        cache.insert(
            entry_id(&format!("B-{n}")),
            Item::new(json!({"body": format!("bill {n}")})),
        );
    }
    cache.save(&cfg.item_cache_path()).unwrap();

    // B-4 claims to be done but its content never reached the cache
    let mut ledger = ProgressLedger::new();
    for n in 1..=4 {
        ledger.record(entry_id(&format!("B-{n}")), LedgerClass::Done);
    }
    ledger.save(&cfg.ledger_path()).unwrap();

    let index = MockIndex::new().with_type("bill", "B", 5);
    let fetcher = Arc::new(MockFetcher::ok());
    let summary = HarvestEngine::new(cfg.clone())
        .unwrap()
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(summary.demoted, 1);
    assert_eq!(summary.already_handled, 3);
    assert_eq!(summary.work_set, 2);
    assert_eq!(fetcher.fetched_ids(), vec![entry_id("B-4"), entry_id("B-5")]);

    let ledger = ProgressLedger::load(&cfg.ledger_path());
    assert_eq!(ledger.done().len(), 5);
}

#[tokio::test]
async fn test_demotion_is_persisted_even_without_work() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill"]);

    let mut cache = ItemCache::new();
    cache.insert(entry_id("B-1"), Item::no_content_marker());
    cache.save(&cfg.item_cache_path()).unwrap();

    let mut ledger = ProgressLedger::new();
    ledger.record(entry_id("B-9"), LedgerClass::Done);
    ledger.record(entry_id("B-1"), LedgerClass::NoContent);
    ledger.save(&cfg.ledger_path()).unwrap();

    // B-9 is no longer listed, so nothing gets fetched
    let index = MockIndex::new().with_type("bill", "B", 1);
    let summary = HarvestEngine::new(cfg.clone())
        .unwrap()
        .run(&index, MockFetcher::ok(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(summary.demoted, 1);
    assert_eq!(summary.work_set, 0);
    assert_eq!(summary.flushes, 1);

    let ledger = ProgressLedger::load(&cfg.ledger_path());
    assert!(ledger.done().is_empty());
    assert_eq!(ledger.class_of(&entry_id("B-1")), Some(LedgerClass::NoContent));
}

#[tokio::test]
async fn test_empty_and_skipped_ids_are_refetched_after_cache_loss() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill"]);

    let mut ledger = ProgressLedger::new();
    ledger.record(entry_id("B-1"), LedgerClass::NoContent);
    ledger.record(entry_id("B-2"), LedgerClass::SkippedTooLarge);
    ledger.save(&cfg.ledger_path()).unwrap();
    assert!(!cfg.item_cache_path().exists());

    let index = MockIndex::new().with_type("bill", "B", 2);
    let fetcher = Arc::new(MockFetcher::ok());
    let summary = HarvestEngine::new(cfg.clone())
        .unwrap()
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(summary.demoted, 2);
    assert_eq!(summary.already_handled, 0);
    assert_eq!(summary.work_set, 2);
    assert_eq!(fetcher.fetched_ids(), vec![entry_id("B-1"), entry_id("B-2")]);

    let ledger = ProgressLedger::load(&cfg.ledger_path());
    assert_eq!(ledger.done().len(), 2);
    assert!(ledger.no_content().is_empty());
    assert!(ledger.skipped_too_large().is_empty());
}

#[test]
fn test_overlapping_ledger_sets_are_normalized_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(
        &path,
        r#"{
            "schema_version": "1.0.0",
            "done": ["B-1", "B-2"],
            "no_content": ["B-2", "B-3"],
            "skipped_too_large": ["B-3", "B-4"],
            "updated_at": "2024-05-01T12:00:00Z"
        }"#,
    )
    .unwrap();

    let ledger = ProgressLedger::load(&path);
    assert_eq!(ledger.class_of(&entry_id("B-2")), Some(LedgerClass::Done));
    assert_eq!(
        ledger.class_of(&entry_id("B-3")),
        Some(LedgerClass::SkippedTooLarge)
    );
    assert_eq!(ledger.total(), 4);
}

#[test]
fn test_foreign_schema_version_is_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(
        &path,
        r#"{"schema_version": "9.0.0", "done": ["B-1"], "no_content": [],
            "skipped_too_large": [], "updated_at": "2024-05-01T12:00:00Z"}"#,
    )
    .unwrap();

    assert_eq!(ProgressLedger::load(&path).total(), 0);
}
