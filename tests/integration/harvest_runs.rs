//! End-to-end harvest runs against in-memory collaborators

use super::support::{config, doc_type, entry_id, Behaviour, MockFetcher, MockIndex};
use index_harvester::harvester::{HarvestConfig, HarvestEngine};
use index_harvester::resume::{ItemCache, LedgerClass, ProgressLedger};
use index_harvester::shutdown::{InterruptCoordinator, RunState};
use index_harvester::{NonEmptyContent, Sentinel};
use std::sync::Arc;
use tempfile::TempDir;

fn three_type_index() -> MockIndex {
    MockIndex::new()
        .with_type("bill", "B", 100)
        .with_type("motion", "M", 100)
        .with_type("amendment", "A", 50)
}

#[tokio::test]
async fn test_limited_run_with_transient_failures() {
    let dir = TempDir::new().unwrap();
    let index = three_type_index();
    let cfg = config(dir.path(), &["bill", "motion", "amendment"])
        .with_eligible_types(vec![doc_type("bill"), doc_type("motion")])
        .with_limit(100)
        .with_flush_interval(40)
        .with_workers(3);

    // Every tenth item times out once before succeeding
    let fetcher = Arc::new(MockFetcher::scripted(|e| {
        if e.id.ordinal().unwrap() % 10 == 0 {
            Behaviour::TransientOnce
        } else {
            Behaviour::Ok
        }
    }));

    let engine = HarvestEngine::new(cfg.clone()).unwrap();
    let interrupt = InterruptCoordinator::shared();
    let summary = engine
        .run_shared(&index, fetcher.clone(), interrupt.clone())
        .await
        .unwrap();

    assert_eq!(summary.discovered, 250);
    assert!(summary.discovery_complete);
    assert_eq!(summary.work_set, 100);
    assert_eq!(summary.attempted(), 100);
    assert_eq!(summary.outcomes.done, 100);
    assert_eq!(summary.outcomes.errors, 0);
    assert_eq!(summary.flushes, 3);
    assert!(!summary.interrupted);
    assert_eq!(interrupt.state(), RunState::Exiting);
    assert_eq!(fetcher.attempts(), 110);
    assert!(fetcher
        .fetched_ids()
        .iter()
        .all(|id| id.as_str().starts_with("B-")));

    let ledger = ProgressLedger::load(&cfg.ledger_path());
    assert_eq!(ledger.done().len(), 100);
    assert!(!cfg.checkpoint_path().exists());

    // The next run picks up the other eligible type and never touches amendments
    let fetcher = Arc::new(MockFetcher::ok());
    let summary = engine
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();
    assert_eq!(summary.already_handled, 100);
    assert_eq!(summary.work_set, 100);
    assert_eq!(summary.outcomes.done, 100);
    assert!(fetcher
        .fetched_ids()
        .iter()
        .all(|id| id.as_str().starts_with("M-")));
    assert_eq!(ProgressLedger::load(&cfg.ledger_path()).done().len(), 200);
}

#[tokio::test]
async fn test_rerun_after_completion_fetches_nothing() {
    let dir = TempDir::new().unwrap();
    let index = MockIndex::new().with_type("bill", "B", 30).with_type("motion", "M", 20);
    let cfg = config(dir.path(), &["bill", "motion"]).with_flush_interval(7);
    let engine = HarvestEngine::new(cfg.clone()).unwrap();

    let first = engine
        .run(&index, MockFetcher::ok(), InterruptCoordinator::shared())
        .await
        .unwrap();
    assert_eq!(first.outcomes.done, 50);
    assert!(first.completed_all());

    let ledger_bytes = std::fs::read(cfg.ledger_path()).unwrap();
    let cache_bytes = std::fs::read(cfg.item_cache_path()).unwrap();

    let fetcher = Arc::new(MockFetcher::ok());
    let second = engine
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(second.work_set, 0);
    assert_eq!(second.attempted(), 0);
    assert_eq!(second.flushes, 0);
    assert_eq!(fetcher.attempts(), 0);
    assert_eq!(std::fs::read(cfg.ledger_path()).unwrap(), ledger_bytes);
    assert_eq!(std::fs::read(cfg.item_cache_path()).unwrap(), cache_bytes);
}

#[tokio::test]
async fn test_interrupt_loses_no_completed_work() {
    let dir = TempDir::new().unwrap();
    let index = MockIndex::new().with_type("bill", "B", 40);
    let cfg = config(dir.path(), &["bill"])
        .with_workers(1)
        .with_flush_interval(100);
    let engine = HarvestEngine::new(cfg.clone()).unwrap();

    let interrupt = InterruptCoordinator::shared();
    let first_fetcher = Arc::new(MockFetcher::ok().interrupt_after(10, interrupt.clone()));
    let first = engine
        .run_shared(&index, first_fetcher.clone(), interrupt.clone())
        .await
        .unwrap();

    assert!(first.interrupted);
    assert_eq!(first.attempted(), 10);
    assert_eq!(first.not_started, 30);
    assert!(!first.completed_all());
    assert_eq!(interrupt.state(), RunState::Exiting);

    // Everything that completed before the interrupt is on disk
    let ledger = ProgressLedger::load(&cfg.ledger_path());
    let cache = ItemCache::load(&cfg.item_cache_path());
    assert_eq!(ledger.done().len(), 10);
    for id in first_fetcher.fetched_ids() {
        assert_eq!(ledger.class_of(&id), Some(LedgerClass::Done));
        assert!(cache.has_usable(&id, &NonEmptyContent));
    }

    let second_fetcher = Arc::new(MockFetcher::ok());
    let second = engine
        .run_shared(&index, second_fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();
    assert_eq!(second.work_set, 30);
    assert_eq!(second.outcomes.done, 30);
    assert!(second.completed_all());

    // No id was fetched in both runs
    let mut all = first_fetcher.fetched_ids();
    all.extend(second_fetcher.fetched_ids());
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 40);
    assert_eq!(ProgressLedger::load(&cfg.ledger_path()).done().len(), 40);
}

fn mixed_outcomes() -> MockFetcher {
    MockFetcher::scripted(|e| match e.id.ordinal().unwrap() % 5 {
        1 => Behaviour::Empty,
        2 => Behaviour::TooLarge,
        _ => Behaviour::Ok,
    })
}

#[tokio::test]
async fn test_resume_after_any_interrupt_point_matches_uninterrupted_run() {
    const TOTAL: usize = 12;
    let index = MockIndex::new().with_type("bill", "B", TOTAL as u64);
    let tune = |cfg: HarvestConfig| cfg.with_workers(3).with_flush_interval(4);

    let baseline_dir = TempDir::new().unwrap();
    let baseline_cfg = tune(config(baseline_dir.path(), &["bill"]));
    let baseline = HarvestEngine::new(baseline_cfg.clone())
        .unwrap()
        .run(&index, mixed_outcomes(), InterruptCoordinator::shared())
        .await
        .unwrap();
    assert!(baseline.completed_all());
    let baseline_ledger = ProgressLedger::load(&baseline_cfg.ledger_path());
    let baseline_cache = ItemCache::load(&baseline_cfg.item_cache_path());
    assert_eq!(baseline_ledger.total(), TOTAL);

    for n in 0..=TOTAL {
        let dir = TempDir::new().unwrap();
        let cfg = tune(config(dir.path(), &["bill"]));
        let engine = HarvestEngine::new(cfg.clone()).unwrap();

        let interrupt = InterruptCoordinator::shared();
        if n == 0 {
            interrupt.signal();
        }
        let first_fetcher = Arc::new(mixed_outcomes().interrupt_after(n, interrupt.clone()));
        let first = engine
            .run_shared(&index, first_fetcher.clone(), interrupt)
            .await
            .unwrap();
        assert!(first.interrupted, "n={n}");

        // Every item a worker finished, in flight ones included, is durable
        let ledger = ProgressLedger::load(&cfg.ledger_path());
        let cache = ItemCache::load(&cfg.item_cache_path());
        for id in first_fetcher.fetched_ids() {
            assert!(ledger.is_handled(&id), "n={n}: {id} lost from ledger");
            assert!(cache.get(&id).is_some(), "n={n}: {id} lost from cache");
        }

        let second_fetcher = Arc::new(mixed_outcomes());
        let second = engine
            .run_shared(&index, second_fetcher.clone(), InterruptCoordinator::shared())
            .await
            .unwrap();
        assert!(second.completed_all(), "n={n}");
        assert_eq!(second.work_set + first.attempted(), TOTAL, "n={n}");

        let first_ids = first_fetcher.fetched_ids();
        assert!(
            second_fetcher
                .fetched_ids()
                .iter()
                .all(|id| !first_ids.contains(id)),
            "n={n}: an item was fetched twice"
        );

        assert_eq!(ProgressLedger::load(&cfg.ledger_path()), baseline_ledger, "n={n}");
        assert_eq!(ItemCache::load(&cfg.item_cache_path()), baseline_cache, "n={n}");
    }
}

#[tokio::test]
async fn test_interrupt_during_discovery_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let interrupt = InterruptCoordinator::shared();
    let index = MockIndex::new()
        .with_type("bill", "B", 250)
        .interrupt_on_call(2, interrupt.clone());
    let cfg = config(dir.path(), &["bill"]);
    let engine = HarvestEngine::new(cfg.clone()).unwrap();

    let fetcher = Arc::new(MockFetcher::ok());
    let summary = engine
        .run_shared(&index, fetcher.clone(), interrupt)
        .await
        .unwrap();

    assert!(summary.interrupted);
    assert!(!summary.discovery_complete);
    assert_eq!(summary.work_set, 0);
    assert_eq!(fetcher.attempts(), 0);
    // Pages one and two were appended before the interrupt was observed
    assert_eq!(summary.discovered, 200);
    assert!(cfg.checkpoint_path().exists());

    let summary = engine
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();
    // Two full pages exceed the page size, so the slot is trusted as is
    assert!(summary.discovery[0].from_checkpoint);
    assert!(summary.discovery_complete);
    assert_eq!(summary.outcomes.done, 200);
    assert!(!cfg.checkpoint_path().exists());
}

#[tokio::test]
async fn test_outcomes_are_classified_and_failures_retried_next_run() {
    let dir = TempDir::new().unwrap();
    let index = MockIndex::new().with_type("bill", "B", 20);
    let cfg = config(dir.path(), &["bill"]).with_workers(4);
    let engine = HarvestEngine::new(cfg.clone()).unwrap();

    let fetcher = MockFetcher::scripted(|e| match e.id.ordinal().unwrap() % 4 {
        0 => Behaviour::Ok,
        1 => Behaviour::Empty,
        2 => Behaviour::TooLarge,
        _ => Behaviour::Permanent,
    });
    let summary = engine
        .run(&index, fetcher, InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(summary.outcomes.done, 5);
    assert_eq!(summary.outcomes.no_content, 5);
    assert_eq!(summary.outcomes.skipped, 5);
    assert_eq!(summary.outcomes.errors, 5);
    assert_eq!(summary.attempted(), 20);
    assert!(!summary.completed_all());

    let ledger = ProgressLedger::load(&cfg.ledger_path());
    assert_eq!(ledger.total(), 15);
    assert_eq!(
        ledger.class_of(&entry_id("B-2")),
        Some(LedgerClass::SkippedTooLarge)
    );
    assert_eq!(ledger.class_of(&entry_id("B-3")), None);
    let cache = ItemCache::load(&cfg.item_cache_path());
    assert_eq!(
        cache.get(&entry_id("B-1")).and_then(|i| i.sentinel()),
        Some(Sentinel::NoContent)
    );

    let fetcher = Arc::new(MockFetcher::ok());
    let summary = engine
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();
    assert_eq!(summary.work_set, 5);
    assert!(fetcher
        .fetched_ids()
        .iter()
        .all(|id| id.ordinal().unwrap() % 4 == 3));
}

#[tokio::test]
async fn test_reset_keeps_cached_content() {
    let dir = TempDir::new().unwrap();
    let index = MockIndex::new().with_type("bill", "B", 10);
    let cfg = config(dir.path(), &["bill"]);

    let fetcher = MockFetcher::scripted(|e| {
        if e.id.ordinal().unwrap() <= 3 {
            Behaviour::Empty
        } else {
            Behaviour::Ok
        }
    });
    HarvestEngine::new(cfg.clone())
        .unwrap()
        .run(&index, fetcher, InterruptCoordinator::shared())
        .await
        .unwrap();

    let engine = HarvestEngine::new(cfg.clone().with_reset(true)).unwrap();
    let fetcher = Arc::new(MockFetcher::ok());
    let summary = engine
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();

    // Usable cached items still count as handled; the empty ones are retried
    assert_eq!(summary.already_handled, 7);
    assert_eq!(summary.work_set, 3);
    assert_eq!(
        fetcher.fetched_ids(),
        vec![entry_id("B-1"), entry_id("B-2"), entry_id("B-3")]
    );
}

#[tokio::test]
async fn test_verify_rebuilds_lost_ledger_from_cache() {
    let dir = TempDir::new().unwrap();
    let index = MockIndex::new().with_type("bill", "B", 12);
    let cfg = config(dir.path(), &["bill"]);

    let fetcher = MockFetcher::scripted(|e| match e.id.ordinal().unwrap() {
        1 | 2 => Behaviour::Empty,
        3 => Behaviour::TooLarge,
        _ => Behaviour::Ok,
    });
    HarvestEngine::new(cfg.clone())
        .unwrap()
        .run(&index, fetcher, InterruptCoordinator::shared())
        .await
        .unwrap();

    std::fs::write(cfg.ledger_path(), b"{ not json").unwrap();

    let engine = HarvestEngine::new(cfg.clone().with_verify(true)).unwrap();
    let fetcher = Arc::new(MockFetcher::ok());
    let summary = engine
        .run_shared(&index, fetcher.clone(), InterruptCoordinator::shared())
        .await
        .unwrap();

    assert_eq!(summary.work_set, 0);
    assert_eq!(fetcher.attempts(), 0);
    let ledger = ProgressLedger::load(&cfg.ledger_path());
    assert_eq!(ledger.done().len(), 9);
    assert_eq!(ledger.no_content().len(), 2);
    assert_eq!(ledger.skipped_too_large().len(), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), &["bill"]).with_workers(0);
    assert!(HarvestEngine::new(cfg).is_err());

    let cfg = config(dir.path(), &["bill"]).with_eligible_types(vec![doc_type("motion")]);
    assert!(HarvestEngine::new(cfg).is_err());
}
