pub mod deferred;
pub mod orchestrator;
pub mod pool;
pub mod sweep;

pub use orchestrator::{DispatchOutcome, Dispatcher, DispatcherDeps, SuppressReason};
pub use sweep::{RetrySweep, SweepReport};
