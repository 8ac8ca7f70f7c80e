//! Per-target crawl-delay gate.
//!
//! Serialises requests against a single remote target so that two callers
//! asking for a delay never start within less than that delay of each other.
//! The caller that opens a window proceeds immediately; the delay itself is
//! slept out by a detached timer task while everyone else queues.
//!
//! # Gate States
//!
//! ```text
//! UNLOCKED --[enter(Some(d))]--> LOCKING (flag set, timer spawned)
//!                                   |
//!                                   v
//! UNLOCKED <--[elapsed or interrupted]-- LOCKED (timer running, starter released)
//! ```
//!
//! `enter(None)` never changes state; it only waits out an active window.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{GateError, WaitPhase};
use crate::reporter::{GateEvent, GateReporter, TracingGateReporter};

#[derive(Debug)]
struct ActiveWindow {
    delay: Duration,
    interrupt: CancellationToken,
}

/// Mutable gate state. Only touched under `Shared::state`.
#[derive(Debug, Default)]
struct GateState {
    locked: bool,
    window: Option<ActiveWindow>,
}

struct Shared {
    state: Mutex<GateState>,
    unlocked: Notify,
    reporter: Arc<dyn GateReporter>,
}

impl Shared {
    /// Acquires the state mutex, recovering from poison if necessary.
    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned gate mutex");
            poisoned.into_inner()
        })
    }
}

/// Clears the lock flag and wakes every queued caller when dropped.
///
/// Owned by the timer task, so the unlock runs whether the sleep elapses,
/// is interrupted, or the task is torn down by the runtime.
struct UnlockGuard {
    shared: Arc<Shared>,
    delay: Duration,
}

impl Drop for UnlockGuard {
    fn drop(&mut self) {
        // Reported while the window is still held, so it always precedes the
        // next window's events.
        self.shared
            .reporter
            .report(GateEvent::Unlocked { delay: self.delay });
        {
            let mut state = self.shared.lock_state();
            state.locked = false;
            state.window = None;
        }
        self.shared.unlocked.notify_waiters();
    }
}

/// Crawl-delay gate guarding one target.
///
/// Cloning is cheap and every clone shares the same lock, so worker tasks
/// can each hold their own handle.
#[derive(Clone)]
pub struct DelayGate {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl DelayGate {
    /// Creates an unlocked gate that logs through `tracing`.
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(TracingGateReporter))
    }

    pub fn with_reporter(reporter: Arc<dyn GateReporter>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(GateState::default()),
                unlocked: Notify::new(),
                reporter,
            }),
            shutdown: CancellationToken::new(),
        }
    }

    /// Interrupt every window this gate opens once `parent` is cancelled.
    ///
    /// After cancellation, new windows end as soon as they start, so queued
    /// callers drain instead of sleeping out their delays.
    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    /// Whether a delay window is currently in effect.
    pub fn is_locked(&self) -> bool {
        self.shared.lock_state().locked
    }

    /// Delay of the window currently in effect, if any.
    pub fn current_delay(&self) -> Option<Duration> {
        self.shared.lock_state().window.as_ref().map(|w| w.delay)
    }

    /// Cuts the active window short. Returns `false` if the gate was unlocked.
    pub fn interrupt(&self) -> bool {
        let state = self.shared.lock_state();
        match &state.window {
            Some(window) => {
                window.interrupt.cancel();
                true
            }
            None => false,
        }
    }

    /// Pass the gate before issuing a request to the target.
    ///
    /// - Waits for any active window to end.
    /// - `None`: returns once the gate is unlocked, leaving it unlocked.
    /// - `Some(d)`: locks the gate for `d` and returns as soon as the window
    ///   is running; the next caller is held back until `d` has passed.
    pub async fn enter(&self, delay: Option<Duration>) -> Result<(), GateError> {
        self.enter_inner(delay, None).await
    }

    /// Like [`enter`](Self::enter), but gives up with
    /// [`GateError::Interrupted`] once `cancel` fires.
    ///
    /// A caller whose token is already cancelled never opens a window. A
    /// window already started by this caller keeps running to completion
    /// even if the caller is cancelled while confirming it.
    pub async fn enter_until(
        &self,
        delay: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(), GateError> {
        self.enter_inner(delay, Some(cancel)).await
    }

    async fn enter_inner(
        &self,
        delay: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), GateError> {
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(cancelled);

        let (guard, interrupt) = loop {
            if delay.is_some() && cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(self.interrupted(WaitPhase::Queued));
            }

            let notified = self.shared.unlocked.notified();
            tokio::pin!(notified);
            // Register before looking at the flag so an unlock landing between
            // the check and the await is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock_state();
                if !state.locked {
                    let Some(delay) = delay else {
                        return Ok(());
                    };
                    break self.claim_window(&mut state, delay);
                }
            }

            self.shared.reporter.report(GateEvent::Waiting);
            tokio::select! {
                () = &mut notified => self.shared.reporter.report(GateEvent::Released),
                () = &mut cancelled => return Err(self.interrupted(WaitPhase::Queued)),
            }
        };

        let ready = self.start_window(guard, interrupt);
        tokio::select! {
            confirmed = ready => match confirmed {
                Ok(()) => Ok(()),
                // Timer task was torn down before it could confirm; its guard
                // has already unlocked the gate.
                Err(_) => Err(self.interrupted(WaitPhase::Confirming)),
            },
            () = &mut cancelled => Err(self.interrupted(WaitPhase::Confirming)),
        }
    }

    /// Sets the lock flag and hands back the guard that will clear it.
    ///
    /// Must be called with the state mutex held and the gate unlocked.
    fn claim_window(
        &self,
        state: &mut GateState,
        delay: Duration,
    ) -> (UnlockGuard, CancellationToken) {
        let interrupt = self.shutdown.child_token();
        state.locked = true;
        state.window = Some(ActiveWindow {
            delay,
            interrupt: interrupt.clone(),
        });

        let guard = UnlockGuard {
            shared: Arc::clone(&self.shared),
            delay,
        };
        (guard, interrupt)
    }

    /// Spawns the timer task for a claimed window.
    ///
    /// Must be called without the state mutex: a runtime that is shutting
    /// down drops the task inside `spawn`, and the guard unlocks right there.
    fn start_window(
        &self,
        guard: UnlockGuard,
        interrupt: CancellationToken,
    ) -> oneshot::Receiver<()> {
        self.shared
            .reporter
            .report(GateEvent::Locking { delay: guard.delay });

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(run_window(guard, interrupt, ready_tx));
        ready_rx
    }

    fn interrupted(&self, phase: WaitPhase) -> GateError {
        self.shared
            .reporter
            .report(GateEvent::CallerInterrupted { phase });
        GateError::Interrupted(phase)
    }
}

impl Default for DelayGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DelayGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("DelayGate")
            .field("locked", &state.locked)
            .field("delay", &state.window.as_ref().map(|w| w.delay))
            .finish()
    }
}

/// Body of the detached timer task: confirm, sleep, unlock.
async fn run_window(
    guard: UnlockGuard,
    interrupt: CancellationToken,
    ready: oneshot::Sender<()>,
) {
    let delay = guard.delay;
    let reporter = Arc::clone(&guard.shared.reporter);

    reporter.report(GateEvent::WindowStarted { delay });
    // The starter may already have given up; the window runs regardless.
    let _ = ready.send(());

    tokio::select! {
        () = tokio::time::sleep(delay) => reporter.report(GateEvent::WindowElapsed { delay }),
        () = interrupt.cancelled() => reporter.report(GateEvent::WindowInterrupted { delay }),
    }

    drop(guard);
}
