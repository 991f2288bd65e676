//! LRA coordinator entry point
//!
//! Parses arguments and dispatches through `cli::run`; errors are printed
//! to stderr and exit non-zero. All other logic lives in the CLI module.

use lra_coordinator::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
