//! Command-line interface
//!
//! - run: boot the coordinator and recover periodically until Ctrl-C
//! - recover: one recovery sweep, report printed as JSON
//! - inspect: print persisted records (text or versioned JSON)

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{inspect, recover, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
