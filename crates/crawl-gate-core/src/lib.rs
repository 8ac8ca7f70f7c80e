pub mod config;
pub mod error;
pub mod gate;
pub mod gated;
pub mod reporter;
pub mod testutil;
pub mod traits;

pub use config::{GateConfig, parse_delay_secs};
pub use error::{AppError, GateError, WaitPhase};
pub use gate::DelayGate;
pub use gated::GatedFetcher;
pub use reporter::{GateEvent, GateReporter, NullGateReporter, TracingGateReporter};
pub use traits::Fetcher;
