//! Process-wide REPL lock.
//!
//! The browser-side REPL is a single shared resource: one automation process
//! drives it at a time. The lock has two layers with one call surface:
//!
//! - an advisory OS lock on a lock file, excluding other processes,
//! - a process-wide hold count, letting verbs in this process assert that
//!   the lock is held before touching the REPL.
//!
//! Acquisition blocks until any other process releases the file lock.
//! Within one process, holds nest: each [`lock`] increments the count and
//! each [`unlock`] decrements it; the file lock is released only when the
//! count reaches zero, so a scoped inner hold never drops an outer one.
//!
//! [`locked`] reports only this process's status; another process holding
//! the file lock still reads as unlocked here (acquisition will simply
//! block).

// ============================================================================
// Imports
// ============================================================================

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// State
// ============================================================================

/// The held lock: open file, its path, and the nesting depth of this
/// process's holds. Dropping the file releases the OS lock.
struct HeldLock {
    _file: File,
    path: PathBuf,
    depth: u32,
}

static REPL_LOCK: Mutex<Option<HeldLock>> = Mutex::new(None);

// ============================================================================
// Operations
// ============================================================================

/// Acquires the REPL lock for this process, blocking while another process
/// holds it.
///
/// Reentrant: if this process already holds the lock, the hold count is
/// incremented without touching the file. Every acquisition must be paired
/// with an [`unlock`]; the file lock is released on the last one.
///
/// # Errors
///
/// Returns [`Error::LockFile`] when the lock file cannot be opened or
/// locked.
pub fn lock(path: &Path) -> Result<()> {
    let mut held = REPL_LOCK.lock();
    if let Some(lock) = held.as_mut() {
        lock.depth += 1;
        debug!(depth = lock.depth, "REPL already locked by this process");
        return Ok(());
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| Error::lock_file(format!("cannot open {}: {e}", path.display())))?;

    file.lock_exclusive()
        .map_err(|e| Error::lock_file(format!("cannot lock {}: {e}", path.display())))?;

    debug!(path = %path.display(), "REPL locked");
    *held = Some(HeldLock {
        _file: file,
        path: path.to_path_buf(),
        depth: 1,
    });
    Ok(())
}

/// Releases one hold of the REPL lock.
///
/// The file lock is released when the last hold goes.
pub fn unlock() {
    let mut held = REPL_LOCK.lock();
    let Some(lock) = held.as_mut() else {
        warn!("unlock called without holding the REPL lock");
        return;
    };

    if lock.depth > 1 {
        lock.depth -= 1;
        debug!(depth = lock.depth, "Released nested REPL hold");
        return;
    }

    if let Some(lock) = held.take() {
        debug!(path = %lock.path.display(), "REPL unlocked");
    }
}

/// Returns `true` if this process holds the REPL lock.
///
/// Applies only to this process: a lock held elsewhere reads as `false`.
#[must_use]
pub fn locked() -> bool {
    REPL_LOCK.lock().is_some()
}

/// Asserts that this process holds the REPL lock.
///
/// # Errors
///
/// Returns [`Error::LockRequired`] when it does not.
pub fn check_locked() -> Result<()> {
    if locked() { Ok(()) } else { Err(Error::LockRequired) }
}

/// Runs a closure while holding the REPL lock, releasing it afterwards.
///
/// # Errors
///
/// Returns [`Error::LockFile`] when acquisition fails; the closure does not
/// run in that case.
pub fn with_lock<T>(path: &Path, f: impl FnOnce() -> T) -> Result<T> {
    let guard = LockGuard::acquire(path)?;
    let result = f();
    guard.release();
    Ok(result)
}

/// RAII acquisition: locks on construction, unlocks on drop.
///
/// Holds nest, so a guard taken while the process already holds the lock
/// releases only its own hold.
#[derive(Debug)]
pub struct LockGuard {
    released: bool,
}

impl LockGuard {
    /// Acquires the REPL lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockFile`] when acquisition fails.
    pub fn acquire(path: &Path) -> Result<Self> {
        lock(path)?;
        Ok(Self { released: false })
    }

    /// Releases the lock early.
    pub fn release(mut self) {
        self.released = true;
        unlock();
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            unlock();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::ReentrantMutex;

    // The lock under test is process-wide; serialize the tests themselves.
    static TEST_SERIAL: ReentrantMutex<()> = ReentrantMutex::new(());

    #[test]
    fn test_lock_unlock_cycle() {
        let _serial = TEST_SERIAL.lock();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repl.lock");

        assert!(!locked());
        lock(&path).expect("lock");
        assert!(locked());
        assert!(path.exists());

        // Reentrant within the process; each hold needs its own release.
        lock(&path).expect("relock");
        assert!(locked());
        unlock();
        assert!(locked());

        unlock();
        assert!(!locked());
    }

    #[test]
    fn test_nested_scoped_hold_preserves_outer_lock() {
        let _serial = TEST_SERIAL.lock();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repl.lock");

        lock(&path).expect("lock");

        with_lock(&path, || assert!(locked())).expect("with_lock");
        assert!(locked(), "outer hold must survive a scoped inner one");

        {
            let _guard = LockGuard::acquire(&path).expect("acquire");
            assert!(locked());
        }
        assert!(locked(), "outer hold must survive a nested guard");

        unlock();
        assert!(!locked());
    }

    #[test]
    fn test_check_locked_gate() {
        let _serial = TEST_SERIAL.lock();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repl.lock");

        assert!(matches!(check_locked(), Err(Error::LockRequired)));

        lock(&path).expect("lock");
        assert!(check_locked().is_ok());
        unlock();
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let _serial = TEST_SERIAL.lock();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repl.lock");

        {
            let _guard = LockGuard::acquire(&path).expect("acquire");
            assert!(locked());
        }
        assert!(!locked());
    }

    #[test]
    fn test_guard_early_release() {
        let _serial = TEST_SERIAL.lock();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repl.lock");

        let guard = LockGuard::acquire(&path).expect("acquire");
        guard.release();
        assert!(!locked());
    }

    #[test]
    fn test_with_lock_releases_on_exit() {
        let _serial = TEST_SERIAL.lock();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repl.lock");

        let value = with_lock(&path, || {
            assert!(locked());
            7
        })
        .expect("with_lock");
        assert_eq!(value, 7);
        assert!(!locked());
    }

    #[test]
    fn test_unlock_without_lock_is_harmless() {
        let _serial = TEST_SERIAL.lock();
        unlock();
        assert!(!locked());
    }
}
