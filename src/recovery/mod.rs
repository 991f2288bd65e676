//! Recovery subsystem
//!
//! Guarantees every started LRA eventually reaches a terminal status
//! despite restarts and participant failures. The sweep scans the
//! `lra-active` records and re-drives the coordinator for LRAs that are
//! ending but idle, and cancels Active LRAs past their deadline.
//!
//! `lra-failed` records are never swept; operators release them with forget.

mod scheduler;
mod sweep;

pub use scheduler::{IntervalScheduler, ScheduledSweep, SweepScheduler};
pub use sweep::{RecoverySweep, SweepReport};
