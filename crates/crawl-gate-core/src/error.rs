use std::fmt;

use thiserror::Error;

/// Where a caller was suspended when its cancellation fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    /// Queued behind a window started by another caller.
    Queued,
    /// Waiting for the timer task to confirm the caller's own window.
    Confirming,
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPhase::Queued => write!(f, "queued behind an active window"),
            WaitPhase::Confirming => write!(f, "confirming window start"),
        }
    }
}

/// Failures surfaced by [`DelayGate::enter`](crate::gate::DelayGate::enter).
///
/// Interruption of a window's own timer is never returned here: the timer
/// has no caller to report to, so it goes through the gate's reporter.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("Interrupted while {0}")]
    Interrupted(WaitPhase),
}

/// Application-wide error types for crawl-gate.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// robots.txt could not be interpreted.
    #[error("robots.txt error: {0}")]
    RobotsError(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The crawl-delay gate gave up waiting.
    #[error("Crawl gate error: {0}")]
    Gate(#[from] GateError),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("HTTP 429")
                    || msg.contains("HTTP 5")
                    || msg.contains("timeout")
                    || msg.contains("reset")
            }
            _ => false,
        }
    }
}
