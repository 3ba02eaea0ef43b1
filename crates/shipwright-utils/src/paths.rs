//! Locations of everything shipwright persists.
//!
//! ```text
//! <home>/state/workflow.json
//! <home>/artifacts/spec.md
//! <home>/artifacts/files.json
//! <home>/budget/YYYY-MM-DD.json
//! <home>/run.lock
//! ```

use camino::Utf8PathBuf;
use std::cell::RefCell;

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "SHIPWRIGHT_HOME";

// Thread-local override used only in tests to avoid process-global env races.
thread_local! {
    static THREAD_HOME: RefCell<Option<Utf8PathBuf>> = const { RefCell::new(None) };
}

/// Resolve the home directory: test override, then `SHIPWRIGHT_HOME`, then `.shipwright`.
#[must_use]
pub fn shipwright_home() -> Utf8PathBuf {
    if let Some(tl) = THREAD_HOME.with(|tl| tl.borrow().clone()) {
        return tl;
    }
    if let Ok(p) = std::env::var(HOME_ENV)
        && !p.is_empty()
    {
        return Utf8PathBuf::from(p);
    }
    Utf8PathBuf::from(".shipwright")
}

/// Returns `<home>/state`
#[must_use]
pub fn state_dir() -> Utf8PathBuf {
    shipwright_home().join("state")
}

/// Returns `<home>/artifacts`
#[must_use]
pub fn artifacts_dir() -> Utf8PathBuf {
    shipwright_home().join("artifacts")
}

/// Returns `<home>/budget`
#[must_use]
pub fn budget_dir() -> Utf8PathBuf {
    shipwright_home().join("budget")
}

/// Returns `<home>/run.lock`
#[must_use]
pub fn run_lock_path() -> Utf8PathBuf {
    shipwright_home().join("run.lock")
}

/// mkdir -p; treat `AlreadyExists` as success (removes TOCTTOU races)
pub fn ensure_dir_all<P: AsRef<std::path::Path>>(p: P) -> std::io::Result<()> {
    match std::fs::create_dir_all(&p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// RAII guard for isolated home that clears thread-local state on drop
#[cfg(any(test, feature = "test-utils"))]
pub struct HomeGuard {
    inner: tempfile::TempDir,
}

#[cfg(any(test, feature = "test-utils"))]
impl HomeGuard {
    #[must_use]
    pub fn home(&self) -> Utf8PathBuf {
        shipwright_home()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Drop for HomeGuard {
    fn drop(&mut self) {
        THREAD_HOME.with(|tl| *tl.borrow_mut() = None);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl std::ops::Deref for HomeGuard {
    type Target = tempfile::TempDir;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Test helper: give this thread a unique home under the system temp dir.
///
/// Hold the `HomeGuard` for the test's duration so the directory stays alive.
/// Only affects the calling thread, so use it with current-thread runtimes.
#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn with_isolated_home() -> HomeGuard {
    let td = tempfile::TempDir::new().expect("create temp home");
    let p = Utf8PathBuf::from_path_buf(td.path().to_path_buf()).expect("utf-8 temp dir");
    THREAD_HOME.with(|tl| *tl.borrow_mut() = Some(p));
    HomeGuard { inner: td }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_home_overrides_and_resets() {
        let expected;
        {
            let guard = with_isolated_home();
            expected = Utf8PathBuf::from_path_buf(guard.path().to_path_buf()).unwrap();
            assert_eq!(shipwright_home(), expected);
            assert_eq!(state_dir(), expected.join("state"));
            assert_eq!(budget_dir(), expected.join("budget"));
            assert_eq!(run_lock_path(), expected.join("run.lock"));
        }
        assert_ne!(shipwright_home(), expected);
    }

    #[test]
    fn test_ensure_dir_all_is_idempotent() {
        let guard = with_isolated_home();
        let dir = guard.path().join("a").join("b");
        ensure_dir_all(&dir).unwrap();
        ensure_dir_all(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
