use std::time::Duration;

use crawl_gate_core::error::{GateError, WaitPhase};
use crawl_gate_core::reporter::GateEvent;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::integration::common::{observed_windows, recording_gate};

const EPSILON: Duration = Duration::from_millis(1);

#[tokio::test(start_paused = true)]
async fn windows_never_overlap_under_mixed_load() {
    let (gate, reporter) = recording_gate();

    let handles: Vec<_> = (0..6u64)
        .map(|worker| {
            let gate = gate.clone();
            tokio::spawn(async move {
                for round in 0..3u64 {
                    let delay = if (worker + round) % 3 == 0 {
                        None
                    } else {
                        Some(Duration::from_millis(100 * (worker + 1)))
                    };
                    gate.enter(delay).await.unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }
    // Let the last window run out.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let windows = observed_windows(&reporter);
    assert_eq!(windows.len(), 12, "6 workers x 3 rounds, 6 without delay");
    for window in &windows {
        assert!(!window.interrupted);
        assert!(window.unlocked - window.started >= window.delay);
    }
    for pair in windows.windows(2) {
        assert!(pair[1].started >= pair[0].unlocked);
    }
}

#[tokio::test(start_paused = true)]
async fn queued_caller_is_released_only_after_window() {
    let (gate, _reporter) = recording_gate();
    let start = Instant::now();

    // Caller A at t=0.
    gate.enter(Some(Duration::from_secs(5))).await.unwrap();

    // Caller B at t=1s, no delay of its own.
    let b = {
        let gate = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            gate.enter(None).await.unwrap();
            Instant::now()
        })
    };

    let released = b.await.unwrap();
    assert!(
        released - start >= Duration::from_secs(5),
        "B released at {:?}",
        released - start
    );
    assert!(!gate.is_locked());
}

#[tokio::test(start_paused = true)]
async fn starter_is_released_immediately_while_queued_caller_waits() {
    let (gate, _reporter) = recording_gate();
    let start = Instant::now();

    gate.enter(Some(Duration::from_secs(2))).await.unwrap();
    let starter_returned = start.elapsed();

    let queued = {
        let gate = gate.clone();
        tokio::spawn(async move {
            gate.enter(Some(Duration::from_secs(2))).await.unwrap();
            Instant::now()
        })
    };

    assert!(starter_returned < EPSILON, "starter took {starter_returned:?}");
    let queued_returned = queued.await.unwrap() - start;
    assert!(queued_returned >= Duration::from_secs(2));
    assert!(queued_returned < Duration::from_secs(2) + Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn interrupted_window_still_unlocks_and_releases_waiters() {
    let (gate, reporter) = recording_gate();
    gate.enter(Some(Duration::from_secs(300))).await.unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let gate = gate.clone();
            tokio::spawn(async move { gate.enter(None).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(gate.interrupt());

    for waiter in waiters {
        waiter.await.unwrap().unwrap();
    }
    assert!(!gate.is_locked());

    let windows = observed_windows(&reporter);
    assert_eq!(windows.len(), 1);
    assert!(windows[0].interrupted);
    assert!(windows[0].unlocked - windows[0].started < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn consecutive_windows_behave_identically() {
    let (gate, reporter) = recording_gate();

    for secs in [1u64, 2, 3] {
        let delay = Duration::from_secs(secs);
        let start = Instant::now();

        gate.enter(Some(delay)).await.unwrap();
        assert!(start.elapsed() < EPSILON);
        assert!(gate.is_locked());
        assert_eq!(gate.current_delay(), Some(delay));

        tokio::time::sleep(delay + EPSILON).await;
        assert!(!gate.is_locked());
        assert_eq!(gate.current_delay(), None);
    }

    let windows = observed_windows(&reporter);
    let delays: Vec<_> = windows.iter().map(|w| w.delay).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3)
        ]
    );
    for window in &windows {
        let held = window.unlocked - window.started;
        assert!(held >= window.delay && held < window.delay + 5 * EPSILON, "held {held:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn no_delay_call_leaves_gate_untouched() {
    let (gate, reporter) = recording_gate();

    for _ in 0..3 {
        gate.enter(None).await.unwrap();
        assert!(!gate.is_locked());
    }

    assert!(reporter.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_caller_leaves_gate_free_for_others() {
    let (gate, reporter) = recording_gate();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = gate
        .enter_until(Some(Duration::from_secs(3)), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, GateError::Interrupted(WaitPhase::Queued));
    assert!(!gate.is_locked());

    // The next caller opens its own window straight away.
    let start = Instant::now();
    gate.enter(Some(Duration::from_secs(1))).await.unwrap();
    assert!(start.elapsed() < EPSILON);

    tokio::time::sleep(Duration::from_secs(1) + EPSILON).await;
    let windows = observed_windows(&reporter);
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].delay, Duration::from_secs(1));
    assert!(!reporter.contains(GateEvent::Locking {
        delay: Duration::from_secs(3)
    }));
}

#[tokio::test(start_paused = true)]
async fn cancelled_waiter_does_not_disturb_other_waiters() {
    let (gate, _reporter) = recording_gate();
    gate.enter(Some(Duration::from_secs(4))).await.unwrap();

    let cancel = CancellationToken::new();
    let cancelled = {
        let gate = gate.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { gate.enter_until(None, &cancel).await })
    };
    let patient = {
        let gate = gate.clone();
        tokio::spawn(async move {
            gate.enter(None).await.unwrap();
            Instant::now()
        })
    };

    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    assert_eq!(
        cancelled.await.unwrap(),
        Err(GateError::Interrupted(WaitPhase::Queued))
    );
    let released = patient.await.unwrap();
    assert!(released - start >= Duration::from_secs(3));
}
