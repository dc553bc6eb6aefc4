//! Cooperative interruption for harvest runs.
//!
//! Provides an [`InterruptCoordinator`] shared between the signal handler, the
//! paginator, and the completion loop. The first interrupt asks the run to
//! stop scheduling new work and drain what is in flight; a second interrupt
//! while draining escalates to an immediate exit.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Shared handle to an interrupt coordinator.
pub type SharedInterrupt = Arc<InterruptCoordinator>;

/// Exit status used when the operator forces an exit (128 + SIGINT).
pub const FORCE_EXIT_CODE: i32 = 130;

/// Lifecycle of a harvest run as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Normal operation.
    Running = 0,
    /// Interrupt received: no new work, in-flight work drains.
    Interrupting = 1,
    /// Final flush done, run is returning its summary.
    Exiting = 2,
    /// Second interrupt while draining: terminate without flushing.
    ForceExit = 3,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunState::Running,
            1 => RunState::Interrupting,
            2 => RunState::Exiting,
            _ => RunState::ForceExit,
        }
    }
}

/// Coordinates cooperative cancellation across async tasks.
#[derive(Debug)]
pub struct InterruptCoordinator {
    state: AtomicU8,
    interrupted_at_least_once: AtomicBool,
    notify: Notify,
}

impl Default for InterruptCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptCoordinator {
    /// Create a new coordinator in [`RunState::Running`].
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RunState::Running as u8),
            interrupted_at_least_once: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedInterrupt {
        Arc::new(Self::new())
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Deliver one interrupt signal and return the resulting state.
    ///
    /// `Running` moves to `Interrupting`; `Interrupting` moves to `ForceExit`.
    /// Signals received in `Exiting` or `ForceExit` change nothing.
    pub fn signal(&self) -> RunState {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            let next = match RunState::from_u8(current) {
                RunState::Running => RunState::Interrupting,
                RunState::Interrupting => RunState::ForceExit,
                other => return other,
            };
            match self.state.compare_exchange(
                current,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.interrupted_at_least_once
                        .store(true, Ordering::SeqCst);
                    self.notify.notify_waiters();
                    return next;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Record that the final flush completed; only valid while running or
    /// interrupting.
    pub fn mark_exiting(&self) {
        let _ = self.state.compare_exchange(
            RunState::Running as u8,
            RunState::Exiting as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let _ = self.state.compare_exchange(
            RunState::Interrupting as u8,
            RunState::Exiting as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Whether new work may still be scheduled.
    pub fn should_continue(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Whether an interrupt has been delivered at any point.
    pub fn was_interrupted(&self) -> bool {
        self.interrupted_at_least_once.load(Ordering::SeqCst)
    }

    /// Wait until an interrupt is delivered. Returns immediately if one
    /// already was.
    pub async fn wait_for_interrupt(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.was_interrupted() {
            return;
        }
        notified.await;
    }
}

/// Spawn a task that feeds Ctrl+C into `coordinator`.
///
/// The second Ctrl+C (while draining) terminates the process immediately
/// with [`FORCE_EXIT_CODE`]; unflushed results are lost.
pub fn install_signal_handler(coordinator: SharedInterrupt) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match coordinator.signal() {
                RunState::Interrupting => {
                    warn!("Interrupt received - finishing in-flight items and saving progress (press Ctrl+C again to force exit)");
                }
                RunState::ForceExit => {
                    warn!("Second interrupt received - exiting immediately without final flush");
                    std::process::exit(FORCE_EXIT_CODE);
                }
                state => {
                    info!(?state, "Interrupt ignored, run already finishing");
                }
            }
        }
    })
}
