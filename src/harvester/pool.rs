//! Bounded-concurrency item fetching
//!
//! Each work-set entry runs as its own task: throttle, fetch (with retries),
//! classify. Whatever happens inside a task, including a panic in the
//! fetcher, comes back as a [`Completion`]; nothing a single item does can
//! abort the batch. Workers never touch durable state.

use super::throttle::SharedThrottle;
use crate::fetcher::retry::{with_retry, RetryPolicy};
use crate::fetcher::{Fetched, ItemFetcher, SkipReason};
use crate::shutdown::SharedInterrupt;
use crate::{IndexEntry, Item};
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Classified result of one item task
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Item fetched
    Success(Item),
    /// Remote resource legitimately empty
    NoContent,
    /// Permanently skipped
    Skipped(SkipReason),
    /// Fetch failed after retries (or the task panicked); retried next run
    Failed(String),
}

impl ItemOutcome {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "done",
            Self::NoContent => "no_content",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "error",
        }
    }
}

impl From<Fetched> for ItemOutcome {
    fn from(fetched: Fetched) -> Self {
        match fetched {
            Fetched::Item(item) => Self::Success(item),
            Fetched::NoContent => Self::NoContent,
            Fetched::Skipped(reason) => Self::Skipped(reason),
        }
    }
}

/// A finished item task
#[derive(Debug, Clone)]
pub struct Completion {
    /// Entry the task worked on
    pub entry: IndexEntry,
    /// What happened
    pub outcome: ItemOutcome,
    /// Wall time spent in the task, throttle waits included
    pub elapsed: Duration,
}

/// Executor running at most `workers` item tasks at once
pub struct WorkerPool<F: ItemFetcher + ?Sized + 'static> {
    fetcher: Arc<F>,
    throttle: SharedThrottle,
    interrupt: SharedInterrupt,
    retry: RetryPolicy,
    workers: usize,
    queue: VecDeque<IndexEntry>,
    tasks: JoinSet<Completion>,
}

impl<F: ItemFetcher + ?Sized + 'static> WorkerPool<F> {
    /// Create a pool
    pub fn new(
        fetcher: Arc<F>,
        throttle: SharedThrottle,
        interrupt: SharedInterrupt,
        workers: usize,
    ) -> Self {
        Self {
            fetcher,
            throttle,
            interrupt,
            retry: RetryPolicy::default(),
            workers: workers.max(1),
            queue: VecDeque::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Retry policy applied to every item fetch
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Queue entries for fetching, in order
    pub fn enqueue(&mut self, entries: impl IntoIterator<Item = IndexEntry>) {
        self.queue.extend(entries);
    }

    /// Entries not yet submitted
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Tasks currently running
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for the next task to finish, in completion order.
    ///
    /// Free worker slots are refilled from the queue first, unless an
    /// interrupt has been delivered. Returns `None` once nothing is in
    /// flight; queued entries left at that point were never started.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.fill();
        loop {
            match self.tasks.join_next().await? {
                Ok(completion) => return Some(completion),
                Err(e) => {
                    // Panics are caught inside the task, so this is a cancelled task
                    error!(error = %e, "Item task ended without a result");
                }
            }
        }
    }

    fn fill(&mut self) {
        while self.tasks.len() < self.workers && self.interrupt.should_continue() {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            debug!(id = %entry.id, in_flight = self.tasks.len() + 1, "Submitting item");
            self.tasks.spawn(run_item(
                self.fetcher.clone(),
                self.throttle.clone(),
                self.interrupt.clone(),
                self.retry,
                entry,
            ));
        }
    }
}

async fn run_item<F: ItemFetcher + ?Sized>(
    fetcher: Arc<F>,
    throttle: SharedThrottle,
    interrupt: SharedInterrupt,
    retry: RetryPolicy,
    entry: IndexEntry,
) -> Completion {
    let start = Instant::now();
    let context = format!("item {}", entry.id);

    let attempt = {
        let (fetcher, throttle, entry) = (&*fetcher, &*throttle, &entry);
        with_retry(&retry, Some(&*interrupt), &context, move || async move {
            throttle.acquire().await;
            fetcher.fetch_item(entry).await
        })
    };

    let outcome = match AssertUnwindSafe(attempt).catch_unwind().await {
        Ok(Ok(fetched)) => ItemOutcome::from(fetched),
        Ok(Err(e)) => {
            warn!(id = %entry.id, error = %e, "Item fetch failed");
            ItemOutcome::Failed(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(id = %entry.id, panic = %message, "Item task panicked");
            ItemOutcome::Failed(format!("task panicked: {message}"))
        }
    };

    Completion {
        entry,
        outcome,
        elapsed: start.elapsed(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
