//! Subprocess harness for crash tests

use std::path::Path;
use std::process::{Command, ExitStatus};

/// Test function the child process runs
pub const CHILD_ENTRY: &str = "crash_child_entry";

/// Scenario the child runs
pub const SCENARIO_ENV: &str = "LRA_CRASH_SCENARIO";

/// Data directory the child opens
pub const DATA_DIR_ENV: &str = "LRA_CRASH_DATA_DIR";

/// Result of a crash test execution
#[derive(Debug)]
pub struct CrashTestResult {
    /// Whether the process stopped at the crash point
    pub crashed: bool,
    /// Exit status if available
    pub exit_status: Option<ExitStatus>,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
}

/// Run `scenario` in a child test process with `crash_point` enabled
pub fn execute_with_crash_point(
    crash_point: &str,
    scenario: &str,
    data_dir: &Path,
) -> CrashTestResult {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            return CrashTestResult {
                crashed: false,
                exit_status: None,
                stdout: String::new(),
                stderr: format!("Failed to locate test binary: {}", e),
            }
        }
    };

    let output = Command::new(exe)
        .args([CHILD_ENTRY, "--exact", "--nocapture", "--test-threads=1"])
        .env("LRA_CRASH_POINT", crash_point)
        .env(SCENARIO_ENV, scenario)
        .env(DATA_DIR_ENV, data_dir)
        .output();

    match output {
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let marker = format!("[CRASH] Triggering crash at point: {}", crash_point);
            CrashTestResult {
                crashed: !output.status.success() && stderr.contains(&marker),
                exit_status: Some(output.status),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr,
            }
        }
        Err(e) => CrashTestResult {
            crashed: false,
            exit_status: None,
            stdout: String::new(),
            stderr: format!("Failed to execute: {}", e),
        },
    }
}

/// Report a child that did not stop where expected
pub fn report_failure(crash_point: &str, result: &CrashTestResult) {
    eprintln!("=== CRASH TEST FAILURE ===");
    eprintln!("Crash point: {}", crash_point);
    eprintln!("Exit status: {:?}", result.exit_status);
    eprintln!("stdout:\n{}", result.stdout);
    eprintln!("stderr:\n{}", result.stderr);
    eprintln!("==========================");
}
