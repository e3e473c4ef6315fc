//! Outbound dispatch for the messaging bridge.
//!
//! Provides:
//! - `DispatchGateway` - Validate and execute one send
//! - `RatePolicy` / `RateWindow` - Pacing and hourly cap accounting
//! - `BulkScheduler` - Paced multi-recipient sending, one job at a time

pub mod gateway;
pub mod policy;
pub mod random;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use gateway::{DispatchError, DispatchGateway, DispatchOutcome, GatewayConfig};
pub use policy::{RatePolicy, RateWindow};
pub use random::{RandomSource, RngSource};
pub use scheduler::{BulkJob, BulkScheduler, BulkSummary, JobError, SchedulerConfig};
