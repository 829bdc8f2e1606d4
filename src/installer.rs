//! # Installer Logic
//!
//! The core of waypost. It is responsible for:
//! 1. Resolving the directory the running executable lives in (`resolve_target_dir`).
//! 2. Idempotently adding that directory to the persisted PATH of both the
//!    User and Machine scope (`run_install` / `upsert`).
//! 3. Backing up the previous value and broadcasting the change to the system.
//!
//! Membership is decided per PATH *segment* (case-insensitive, trailing `\`
//! ignored), never by raw substring search: an existing `C:\Tools-Legacy`
//! entry does not count as `C:\Tools` being present.

use std::path::{Path, PathBuf};
use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use crate::invariant_ppt::assert_invariant;
use crate::system::{Scope, SystemOps};

/// Resolves the absolute directory containing the running executable.
///
/// The result is canonicalized so casing matches what the file system reports,
/// then stripped of the `\\?\` verbatim prefix `canonicalize` produces on
/// Windows (PATH entries with that prefix confuse plenty of tools).
///
/// # Errors
///
/// Fails if the executable location cannot be determined or canonicalized.
/// There is nothing meaningful to install in that case, so the caller aborts
/// before touching either PATH store.
pub fn resolve_target_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot determine the installer's own location")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow!("executable path {:?} has no parent directory", exe))?;
    let canonical = dir
        .canonicalize()
        .with_context(|| format!("cannot canonicalize {:?}", dir))?;
    Ok(strip_verbatim(canonical))
}

/// `\\?\C:\foo` -> `C:\foo`. Leaves non-verbatim paths untouched.
fn strip_verbatim(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix(r"\\?\") {
        Some(rest) => PathBuf::from(rest),
        None => path,
    }
}

/// Normalizes a single PATH segment for comparison.
///
/// Windows paths are case-insensitive, and `C:\Tools\` and `C:\Tools` name the
/// same directory. The original casing is never rewritten; this is only for
/// equality checks.
fn normalize_segment(segment: &str) -> String {
    segment.trim().trim_end_matches('\\').to_lowercase()
}

/// Splits a raw PATH value into its non-empty segments, preserving order and casing.
fn segments(value: &str) -> impl Iterator<Item = &str> {
    value.split(';').filter(|s| !s.trim().is_empty())
}

/// Exact segment membership check (NOT substring containment).
pub fn contains_dir(value: &str, dir: &str) -> bool {
    let wanted = normalize_segment(dir);
    segments(value).any(|s| normalize_segment(s) == wanted)
}

/// How many segments of `value` name `dir`.
fn occurrences(value: &str, dir: &str) -> usize {
    let wanted = normalize_segment(dir);
    segments(value).filter(|s| normalize_segment(s) == wanted).count()
}

/// Re-serializes `value` with `dir` appended as the last segment.
///
/// Existing segments keep their order and casing; empty segments (stray `;;`
/// or a trailing `;`) are dropped rather than carried along. An empty PATH
/// becomes just `dir`, with no leading delimiter.
pub fn append_dir(value: &str, dir: &str) -> String {
    let mut parts: Vec<&str> = segments(value).collect();
    parts.push(dir);
    parts.join(";")
}

/// Adds `target` to one scope's persisted PATH if it is not already a segment of it.
///
/// Returns `Ok(true)` if the store was written, `Ok(false)` if the directory
/// was already present (or this is a dry run). Read and write failures
/// propagate; in particular a Machine-scope write without elevation surfaces
/// the OS "access denied" error unchanged.
pub fn upsert(system: &impl SystemOps, scope: Scope, target: &Path, dry_run: bool) -> Result<bool> {
    let dir = target.to_string_lossy();
    let current = system.read_path(scope)?;

    if contains_dir(&current, &dir) {
        println!("{} is already in {} PATH.", dir, scope);
        return Ok(false);
    }

    let updated = append_dir(&current, &dir);
    assert_invariant(
        occurrences(&updated, &dir) == 1,
        "appended directory occurs exactly once in the new PATH",
        Some("Installer"),
    );
    assert_invariant(
        segments(&current).all(|s| contains_dir(&updated, s)),
        "append preserves every existing PATH segment",
        Some("Installer"),
    );

    if dry_run {
        println!("DRY RUN: would add {} to {} PATH.", dir, scope);
        return Ok(false);
    }

    backup_path(system, scope, &current);
    system.write_path(scope, &updated)?;
    println!("Added {} to {} PATH.", dir, scope);
    Ok(true)
}

/// The whole install: upsert User, then Machine, then notify running apps.
///
/// The two scopes are independent stores updated in sequence. A failure in
/// either is fatal for the run, but a User-scope write that already completed
/// stays in effect; there is deliberately no rollback.
pub fn run_install(system: &impl SystemOps, target: &Path, dry_run: bool) -> Result<()> {
    let user_changed = upsert(system, Scope::User, target, dry_run)?;
    let machine_result = upsert(system, Scope::Machine, target, dry_run);

    // A completed User write stays in effect even when the Machine write is
    // denied, so it must be announced either way.
    if user_changed || matches!(machine_result, Ok(true)) {
        // Best-effort: a missed broadcast just means new terminals only.
        if let Err(e) = system.broadcast_environment_change() {
            warn!("Failed to broadcast environment change: {}", e);
        }
        info!("PATH updated. Already-open terminals keep their old PATH.");
    }

    machine_result.map(|_| ())
}

/// Saves the previous value of a scope's PATH as a restorable `.reg` file
/// under `%LOCALAPPDATA%\waypost\` before we overwrite it.
///
/// Best-effort: an unreadable backup location should not block the install.
fn backup_path(system: &impl SystemOps, scope: Scope, old_value: &str) {
    let Some(base_dirs) = directories::BaseDirs::new() else {
        warn!("Could not locate %LOCALAPPDATA%; skipping PATH backup");
        return;
    };
    let backup_dir = base_dirs.data_local_dir().join("waypost");
    if let Err(e) = std::fs::create_dir_all(&backup_dir) {
        warn!("Failed to create backup directory at {:?}: {}", backup_dir, e);
        return;
    }

    let backup_file = backup_dir.join(format!("{}-path-backup.reg", scope));
    // Escape for .reg file string syntax ("\" -> "\\").
    let escaped = old_value.replace('\\', "\\\\").replace('"', "\\\"");
    let content = format!(
        "Windows Registry Editor Version 5.00\n\n[{}]\n\"Path\"=\"{}\"\n",
        scope.reg_file_hive(),
        escaped
    );

    match system.write_backup_file(&backup_file, &content) {
        Ok(()) => info!("Backed up old {} PATH to {:?}", scope, backup_file),
        Err(e) => warn!("Failed to write {} PATH backup: {}", scope, e),
    }
}

/// Read-only report: is the target directory present in each scope's PATH?
///
/// Never writes anything and never needs elevation (HKLM is world-readable).
pub fn status(system: &impl SystemOps, target: &Path) -> Result<()> {
    let dir = target.to_string_lossy();

    println!();
    println!("Install directory: {}", dir);
    println!();

    for scope in [Scope::User, Scope::Machine] {
        let value = system.read_path(scope)?;
        let count = occurrences(&value, &dir);
        let total = segments(&value).count();
        match count {
            0 => println!("  {} PATH ({} entries): not present", scope, total),
            1 => println!("  {} PATH ({} entries): present", scope, total),
            n => println!("  {} PATH ({} entries): present {} times (duplicates!)", scope, total, n),
        }
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::invariant_ppt::clear_invariant_log;
    use crate::system::MockSystem;

    const TARGET: &str = r"C:\bin\installer";

    fn target() -> PathBuf {
        PathBuf::from(TARGET)
    }

    #[test]
    fn unset_path_gets_exactly_the_target() {
        // Scenario: fresh account, no user Path value at all.
        let system = MockSystem::new();

        run_install(&system, &target(), false).unwrap();

        // No stray leading delimiter.
        assert_eq!(system.path(Scope::User), TARGET);
        assert_eq!(system.path(Scope::Machine), TARGET);
        assert!(*system.broadcast_called.lock().unwrap());
    }

    #[test]
    fn present_entry_is_left_alone() {
        let before = format!(r"C:\Windows;{};C:\Other", TARGET);
        let system = MockSystem::with_path(Scope::User, &before);

        run_install(&system, &target(), false).unwrap();

        // User scope untouched, only the (empty) machine scope was written.
        assert_eq!(system.path(Scope::User), before);
        let writes = system.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, Scope::Machine);
    }

    #[test]
    fn install_is_idempotent() {
        let system = MockSystem::with_path(Scope::User, r"C:\Windows;C:\Windows\system32");

        run_install(&system, &target(), false).unwrap();
        let writes_after_first = system.write_count();
        run_install(&system, &target(), false).unwrap();

        // Second run detected presence in both scopes and wrote nothing.
        assert_eq!(system.write_count(), writes_after_first);
        assert_eq!(occurrences(&system.path(Scope::User), TARGET), 1);
        assert_eq!(occurrences(&system.path(Scope::Machine), TARGET), 1);
    }

    #[test]
    fn machine_denial_keeps_the_user_write() {
        // Scenario: not elevated. HKCU write succeeds, HKLM write is denied.
        let system = MockSystem {
            deny_machine_writes: true,
            ..Default::default()
        };

        let result = run_install(&system, &target(), false);

        assert!(result.is_err());
        assert_eq!(system.path(Scope::User), TARGET, "user write must survive");
        assert_eq!(system.path(Scope::Machine), "", "machine store untouched");
        // The surviving user write still gets announced to running apps.
        assert!(*system.broadcast_called.lock().unwrap());
    }

    #[test]
    fn failing_read_aborts_before_any_write() {
        // A store read that fails for any reason other than a missing value
        // must not be mistaken for an empty PATH: the upsert would then
        // replace the whole store with a single entry.
        let system = MockSystem {
            deny_reads: true,
            ..Default::default()
        };

        let result = run_install(&system, &target(), false);

        assert!(result.is_err());
        assert_eq!(system.write_count(), 0, "no store may be written");
        assert!(!*system.broadcast_called.lock().unwrap());
    }

    #[test]
    fn rewrite_invariants_are_exercised() {
        clear_invariant_log();
        let system = MockSystem::with_path(Scope::User, r"C:\Windows");

        run_install(&system, &target(), false).unwrap();

        assert!(crate::invariant_ppt::invariant_checked(
            "appended directory occurs exactly once in the new PATH"
        ));
        assert!(crate::invariant_ppt::invariant_checked(
            "append preserves every existing PATH segment"
        ));
    }

    #[test]
    fn superstring_entry_does_not_count_as_present() {
        let system = MockSystem::with_path(Scope::User, r"C:\Tools-Legacy;C:\Windows");

        run_install(&system, &PathBuf::from(r"C:\Tools"), false).unwrap();

        let value = system.path(Scope::User);
        assert!(contains_dir(&value, r"C:\Tools"));
        assert!(contains_dir(&value, r"C:\Tools-Legacy"));
        assert_eq!(value, r"C:\Tools-Legacy;C:\Windows;C:\Tools");
    }

    #[test]
    fn membership_ignores_case_and_trailing_backslash() {
        assert!(contains_dir(r"c:\BIN\Installer\;C:\Other", TARGET));
        assert!(!contains_dir(r"C:\bin\installer2", TARGET));
        assert!(!contains_dir("", TARGET));
    }

    #[test]
    fn append_drops_empty_segments() {
        assert_eq!(append_dir(r"C:\a;;C:\b;", r"C:\c"), r"C:\a;C:\b;C:\c");
        assert_eq!(append_dir("", r"C:\c"), r"C:\c");
    }

    #[test]
    fn dry_run_writes_nothing() {
        let system = MockSystem::with_path(Scope::User, r"C:\Windows");

        run_install(&system, &target(), true).unwrap();

        assert_eq!(system.write_count(), 0);
        assert!(!*system.broadcast_called.lock().unwrap());
    }

    #[test]
    fn backup_is_written_before_each_write() {
        let system = MockSystem::with_path(Scope::User, r"C:\Windows");

        run_install(&system, &target(), false).unwrap();

        // One backup per written scope.
        assert_eq!(system.backups.lock().unwrap().len(), 2);
    }

    proptest! {
        #[test]
        fn append_keeps_every_segment_and_adds_target_once(
            entries in prop::collection::vec(r"[A-Za-z]:\\[a-z]{3,8}(\\[a-z]{3,8})?", 0..8)
        ) {
            let value = entries.join(";");

            let updated = append_dir(&value, TARGET);

            for entry in &entries {
                prop_assert!(contains_dir(&updated, entry), "lost segment {:?}", entry);
            }
            prop_assert_eq!(occurrences(&updated, TARGET), 1);
            // Re-serialization never introduces empty segments.
            prop_assert!(updated.split(';').all(|s| !s.is_empty()));
        }

        #[test]
        fn upsert_converges_after_one_write(
            start in r"([A-Za-z]:\\[a-z]{3,8};){0,5}"
        ) {
            let system = MockSystem::with_path(Scope::User, &start);

            upsert(&system, Scope::User, &target(), false).unwrap();
            let after_first = system.path(Scope::User);
            let changed = upsert(&system, Scope::User, &target(), false).unwrap();

            prop_assert!(!changed, "second upsert must be a no-op");
            prop_assert_eq!(system.path(Scope::User), after_first.clone());
            prop_assert_eq!(occurrences(&after_first, TARGET), 1);
        }
    }
}
