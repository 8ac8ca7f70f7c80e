use std::sync::Arc;
use std::time::Duration;

use crawl_gate_core::DelayGate;
use crawl_gate_core::reporter::GateEvent;
use crawl_gate_core::testutil::MockGateReporter;
use tokio::time::Instant;

/// A gate whose events are captured for later inspection.
pub fn recording_gate() -> (DelayGate, Arc<MockGateReporter>) {
    let reporter = Arc::new(MockGateReporter::new());
    (DelayGate::with_reporter(reporter.clone()), reporter)
}

/// A window as seen through the reporter: when it started, when it was
/// unlocked, and the delay it was opened with.
#[derive(Debug)]
pub struct ObservedWindow {
    pub delay: Duration,
    pub started: Instant,
    pub unlocked: Instant,
    pub interrupted: bool,
}

/// Rebuild the sequence of windows from recorded events, asserting that no
/// window starts while another is still active.
pub fn observed_windows(reporter: &MockGateReporter) -> Vec<ObservedWindow> {
    let records = reporter.records.lock().unwrap().clone();
    let mut windows = Vec::new();
    let mut open: Option<(Duration, Instant, bool)> = None;

    for (event, at) in records {
        match event {
            GateEvent::WindowStarted { delay } => {
                assert!(open.is_none(), "Window started at {at:?} while another was active");
                open = Some((delay, at, false));
            }
            GateEvent::WindowInterrupted { .. } => {
                if let Some(window) = open.as_mut() {
                    window.2 = true;
                }
            }
            GateEvent::Unlocked { delay } => {
                let (opened_with, started, interrupted) =
                    open.take().expect("Unlocked without an active window");
                assert_eq!(opened_with, delay);
                windows.push(ObservedWindow {
                    delay,
                    started,
                    unlocked: at,
                    interrupted,
                });
            }
            _ => {}
        }
    }

    assert!(open.is_none(), "A window was still active at the end of the test");
    windows
}
