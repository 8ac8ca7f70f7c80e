//! Gate behaviour on a multi-threaded runtime with real timers, where callers
//! genuinely race each other for the state mutex.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::integration::common::{observed_windows, recording_gate};

const WORKERS: u64 = 32;
const ROUNDS: u64 = 8;

fn delay_for(worker: u64, round: u64) -> Option<Duration> {
    match (worker + round) % 4 {
        0 => None,
        1 => Some(Duration::ZERO),
        n => Some(Duration::from_millis(n)),
    }
}

async fn wait_until_unlocked(gate: &crawl_gate_core::DelayGate) {
    timeout(Duration::from_secs(5), async {
        while gate.is_locked() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("Gate stayed locked");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_callers_never_share_a_window() {
    let (gate, reporter) = recording_gate();
    let mut callers = JoinSet::new();

    for worker in 0..WORKERS {
        let gate = gate.clone();
        callers.spawn(async move {
            for round in 0..ROUNDS {
                gate.enter(delay_for(worker, round)).await.unwrap();
            }
        });
    }

    timeout(Duration::from_secs(30), async {
        while let Some(joined) = callers.join_next().await {
            joined.unwrap();
        }
    })
    .await
    .expect("A caller was never released");
    wait_until_unlocked(&gate).await;

    let windows = observed_windows(&reporter);
    let expected = (0..WORKERS)
        .flat_map(|w| (0..ROUNDS).map(move |r| delay_for(w, r)))
        .filter(Option::is_some)
        .count();
    assert_eq!(windows.len(), expected);

    for window in &windows {
        assert!(!window.interrupted);
        assert!(
            window.unlocked - window.started >= window.delay,
            "Window of {:?} held for {:?}",
            window.delay,
            window.unlocked - window.started
        );
    }
    for pair in windows.windows(2) {
        assert!(pair[1].started >= pair[0].unlocked, "Windows overlapped");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_queued_caller_is_left_behind_after_unlock() {
    let (gate, _reporter) = recording_gate();

    for _ in 0..50 {
        gate.enter(Some(Duration::from_millis(1))).await.unwrap();

        // Waiters arrive while the window is closing, racing its unlock.
        let mut waiters = JoinSet::new();
        for i in 0..16u64 {
            let gate = gate.clone();
            let delay = (i % 4 == 0).then_some(Duration::ZERO);
            waiters.spawn(async move { gate.enter(delay).await });
        }

        while let Some(joined) = timeout(Duration::from_secs(5), waiters.join_next())
            .await
            .expect("Queued caller was never released after the gate unlocked")
        {
            joined.unwrap().unwrap();
        }
    }

    wait_until_unlocked(&gate).await;
}
