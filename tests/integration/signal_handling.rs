use std::time::Duration;

use index_harvester::shutdown::{InterruptCoordinator, RunState};

#[tokio::test]
async fn interrupt_notifies_waiters() {
    let interrupt = InterruptCoordinator::shared();
    let waiter = {
        let handle = interrupt.clone();
        tokio::spawn(async move {
            handle.wait_for_interrupt().await;
            true
        })
    };

    // Give the task time to start waiting
    tokio::time::sleep(Duration::from_millis(50)).await;
    interrupt.signal();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok());
}

/// An interrupt delivered before anyone waits must not be missed.
#[tokio::test]
async fn wait_returns_immediately_when_already_interrupted() {
    let interrupt = InterruptCoordinator::shared();
    interrupt.signal();

    let handle = interrupt.clone();
    let waiter = tokio::spawn(async move {
        handle.wait_for_interrupt().await;
        true
    });

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(
        result.is_ok(),
        "wait_for_interrupt() hung although an interrupt was already delivered"
    );
}

#[tokio::test]
async fn concurrent_waiters_all_notified() {
    let interrupt = InterruptCoordinator::shared();

    let mut waiters = Vec::new();
    for _ in 0..10 {
        let handle = interrupt.clone();
        waiters.push(tokio::spawn(async move {
            handle.wait_for_interrupt().await;
        }));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    interrupt.signal();

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(result.is_ok(), "A waiter was not notified of the interrupt");
    }
}

#[test]
fn second_signal_while_draining_forces_exit() {
    let interrupt = InterruptCoordinator::new();
    assert_eq!(interrupt.signal(), RunState::Interrupting);
    assert!(!interrupt.should_continue());
    assert_eq!(interrupt.signal(), RunState::ForceExit);

    // Nothing can leave the force-exit state
    interrupt.mark_exiting();
    assert_eq!(interrupt.state(), RunState::ForceExit);
}

#[test]
fn signals_after_final_flush_are_ignored() {
    let interrupt = InterruptCoordinator::new();
    interrupt.signal();
    interrupt.mark_exiting();
    assert_eq!(interrupt.state(), RunState::Exiting);

    assert_eq!(interrupt.signal(), RunState::Exiting);
    assert!(interrupt.was_interrupted());
}

#[test]
fn uninterrupted_run_exits_cleanly() {
    let interrupt = InterruptCoordinator::new();
    interrupt.mark_exiting();
    assert_eq!(interrupt.state(), RunState::Exiting);
    assert!(!interrupt.was_interrupted());
    assert_eq!(interrupt.signal(), RunState::Exiting);
}
