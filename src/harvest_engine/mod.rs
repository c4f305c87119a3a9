//! Batch orchestration engine
//!
//! Retry, per-host throttling, per-item processing and the chunked batch
//! runner that ties the resource pool, scrape task, transform pipeline and
//! progress ledger together.

pub mod batch_runner;
pub mod errors;
pub mod item_processor;
pub mod progress;
pub mod retry;
pub mod throttler;

pub use batch_runner::{BatchRunner, RunSummary};
pub use errors::{ErrorKind, HarvestError, HarvestResult};
pub use item_processor::ItemProcessor;
pub use progress::{ItemOutcome, LogProgress, NoOpProgress, ProgressReporter, RunPhase};
pub use retry::RetryPolicy;
pub use throttler::{RequestThrottler, host_of};
