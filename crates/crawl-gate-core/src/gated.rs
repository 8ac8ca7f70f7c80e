//! Crawl-delay enforcement for any [`Fetcher`].
//!
//! Wraps a fetcher with one [`DelayGate`] so that every request to the
//! guarded target first passes the gate. All clones share the gate, so a
//! pool of worker tasks hitting the same host is serialised to one request
//! per crawl-delay window.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use crawl_gate_core::gate::DelayGate;
//! use crawl_gate_core::gated::GatedFetcher;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! # use crawl_gate_core::traits::Fetcher;
//! # #[derive(Clone)] struct MyFetcher;
//! # impl Fetcher for MyFetcher {
//! #     async fn fetch(&self, _: &str) -> Result<String, crawl_gate_core::error::AppError> { todo!() }
//! # }
//! // One request every 2 seconds against this host
//! let fetcher = GatedFetcher::new(MyFetcher, DelayGate::new(), Some(Duration::from_secs(2)));
//! let body = fetcher.fetch("https://example.com/page").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::gate::DelayGate;
use crate::traits::Fetcher;

/// A [`Fetcher`] wrapper that passes a [`DelayGate`] before every request.
#[derive(Clone)]
pub struct GatedFetcher<F> {
    inner: F,
    gate: DelayGate,
    delay: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl<F: Fetcher> GatedFetcher<F> {
    /// Wrap an existing fetcher. `delay: None` only waits out windows
    /// opened by other holders of the same gate.
    pub fn new(inner: F, gate: DelayGate, delay: Option<Duration>) -> Self {
        Self {
            inner,
            gate,
            delay,
            cancel: None,
        }
    }

    /// Abort waiting at the gate with [`AppError::Gate`] once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn gate(&self) -> &DelayGate {
        &self.gate
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }
}

impl<F: Fetcher> Fetcher for GatedFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        match &self.cancel {
            Some(cancel) => self.gate.enter_until(self.delay, cancel).await?,
            None => self.gate.enter(self.delay).await?,
        }
        tracing::trace!(%url, "Gate passed");
        self.inner.fetch(url).await
    }
}
