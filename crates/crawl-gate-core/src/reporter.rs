use std::time::Duration;

use crate::error::WaitPhase;

/// Events emitted by a [`DelayGate`](crate::gate::DelayGate) for monitoring/logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// A caller found the gate locked and is queued.
    Waiting,
    /// A queued caller was woken by an unlock.
    Released,
    /// A caller set the lock flag and is handing off to the timer.
    Locking { delay: Duration },
    /// The timer task owns the window; its starter may proceed.
    WindowStarted { delay: Duration },
    /// The window's sleep ran to completion.
    WindowElapsed { delay: Duration },
    /// The window's sleep was cut short.
    WindowInterrupted { delay: Duration },
    /// The lock flag was cleared and waiters were notified.
    Unlocked { delay: Duration },
    /// A caller's own cancellation fired before `enter` finished.
    CallerInterrupted { phase: WaitPhase },
}

/// Trait for receiving gate events (decoupled logging).
pub trait GateReporter: Send + Sync {
    fn report(&self, event: GateEvent) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingGateReporter;

impl GateReporter for TracingGateReporter {
    fn report(&self, event: GateEvent) {
        match event {
            GateEvent::Waiting => {
                tracing::debug!("Gate locked, waiting for notification");
            }
            GateEvent::Released => {
                tracing::debug!("Notified, re-checking gate");
            }
            GateEvent::Locking { delay } => {
                tracing::debug!(delay_ms = %delay.as_millis(), "Locking target");
            }
            GateEvent::WindowStarted { delay } => {
                tracing::debug!(delay_ms = %delay.as_millis(), "Crawl-delay window started");
            }
            GateEvent::WindowElapsed { delay } => {
                tracing::debug!(delay_ms = %delay.as_millis(), "Crawl-delay window elapsed");
            }
            GateEvent::WindowInterrupted { delay } => {
                tracing::warn!(delay_ms = %delay.as_millis(), "Crawl-delay window interrupted");
            }
            GateEvent::Unlocked { delay } => {
                tracing::debug!(delay_ms = %delay.as_millis(), "Target unlocked");
            }
            GateEvent::CallerInterrupted { phase } => {
                tracing::debug!(%phase, "Caller interrupted");
            }
        }
    }
}

/// Reporter that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGateReporter;

impl GateReporter for NullGateReporter {}
