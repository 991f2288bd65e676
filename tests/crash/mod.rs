//! Crash testing support
//!
//! Crash points abort the process, so every crash runs in a child process:
//! the test binary re-executes itself, running only `crash_child_entry`
//! with `LRA_CRASH_POINT` and the scenario name in its environment.

pub mod harness;

pub use harness::*;
