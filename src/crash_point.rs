//! Crash point injection for testing durability
//!
//! When `LRA_CRASH_POINT` names a point, reaching it terminates the process
//! via `std::process::abort()`: no cleanup, no unwinding, no catching.
//!
//! ```bash
//! LRA_CRASH_POINT=transition_after_persist lra-coordinator run --config coordinator.json
//! ```

use std::sync::OnceLock;

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var("LRA_CRASH_POINT").ok())
        .as_deref()
}

/// Check if a specific crash point is enabled
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Abort the process if the named crash point is enabled
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // start
    pub const START_AFTER_PERSIST: &str = "start_after_persist";
    pub const START_BEFORE_PARENT_LINK: &str = "start_before_parent_link";

    // close / cancel
    pub const TRANSITION_AFTER_PERSIST: &str = "transition_after_persist";

    // fan-out
    pub const FANOUT_AFTER_PLAN: &str = "fanout_after_plan";
    pub const FANOUT_BEFORE_APPLY: &str = "fanout_before_apply";
    pub const FANOUT_AFTER_APPLY: &str = "fanout_after_apply";

    // store moves
    pub const MOVE_AFTER_FAILED_WRITE: &str = "move_after_failed_write";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            START_AFTER_PERSIST,
            START_BEFORE_PARENT_LINK,
            TRANSITION_AFTER_PERSIST,
            FANOUT_AFTER_PLAN,
            FANOUT_BEFORE_APPLY,
            FANOUT_AFTER_APPLY,
            MOVE_AFTER_FAILED_WRITE,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_point_disabled_by_default() {
        assert!(!crash_point_enabled("test_point"));
    }

    #[test]
    fn test_crash_point_names_are_lowercase_with_underscores() {
        for point in points::all() {
            assert!(
                point.chars().all(|c| c.is_lowercase() || c == '_'),
                "Crash point '{}' should be lowercase with underscores",
                point
            );
        }
    }
}
