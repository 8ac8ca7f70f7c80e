//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit and integration tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use crate::error::AppError;
use crate::reporter::{GateEvent, GateReporter};
use crate::traits::Fetcher;

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns queued responses and records request times.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default body.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    /// `(url, instant)` for every call, in call order.
    pub requests: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl MockFetcher {
    pub fn new(body: &str) -> Self {
        Self::with_responses(vec![Ok(body.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Instants at which `fetch` was called, in call order.
    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("default".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockGateReporter
// ---------------------------------------------------------------------------

/// Mock gate reporter that records events with the instant they were seen.
#[derive(Default)]
pub struct MockGateReporter {
    pub records: Arc<Mutex<Vec<(GateEvent, Instant)>>>,
}

impl MockGateReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GateEvent> {
        self.records.lock().unwrap().iter().map(|(e, _)| *e).collect()
    }

    pub fn contains(&self, event: GateEvent) -> bool {
        self.records.lock().unwrap().iter().any(|(e, _)| *e == event)
    }
}

impl GateReporter for MockGateReporter {
    fn report(&self, event: GateEvent) {
        self.records.lock().unwrap().push((event, Instant::now()));
    }
}
