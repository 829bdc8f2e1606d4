use std::collections::HashSet;
use std::sync::Mutex;
use lazy_static::lazy_static;
use log::error;

lazy_static! {
    /// Stores the set of unique invariant keys (descriptions) that have been successfully asserted.
    static ref CHECKED_INVARIANTS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

/// Asserts that a critical invariant of the PATH rewrite holds.
///
/// If the condition is false, this panics in debug/test builds and logs a
/// critical error in release builds. "Fail closed" is the right call for a
/// tool that rewrites machine-wide configuration: better to abort than to
/// persist a mangled PATH.
///
/// # Arguments
/// * `condition` - The boolean result of the check.
/// * `description` - A human-readable description of the invariant
///   (e.g., "appended directory occurs exactly once in the new PATH").
/// * `component` - Optional component tag (e.g., "Installer").
pub fn assert_invariant(condition: bool, description: &str, component: Option<&str>) {
    if !condition {
        let msg = format!(
            "CRITICAL INVARIANT VIOLATION [{}]: {}",
            component.unwrap_or("General"),
            description
        );
        error!("{}", msg);

        if cfg!(debug_assertions) || cfg!(test) {
            panic!("{}", msg);
        }
    } else {
        // Record that we checked this
        if let Ok(mut set) = CHECKED_INVARIANTS.lock() {
            set.insert(description.to_string());
        }
    }
}

/// Returns whether the named invariant was asserted (and held) since the last
/// `clear_invariant_log`. Tests use this to verify the rewrite logic actually
/// runs its checks, not just that the output looks right.
#[cfg(test)]
pub fn invariant_checked(description: &str) -> bool {
    CHECKED_INVARIANTS
        .lock()
        .map(|set| set.contains(description))
        .unwrap_or(false)
}

/// Clears the invariant log. Call this before running a new isolated test.
#[allow(dead_code)]
pub fn clear_invariant_log() {
    if let Ok(mut set) = CHECKED_INVARIANTS.lock() {
        set.clear();
    }
}
