//! Single-flight execution of sync operations.

use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::store::ScriptLock;

/// How long to wait for another operation to finish before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Releases the lock when dropped, so a panicking operation frees it too.
struct LockGuard<'a, L: ScriptLock> {
    lock: &'a mut L,
}

impl<L: ScriptLock> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Run `f` while holding `lock`.
///
/// The lock is tried once; if it is not acquired within `timeout` the
/// operation fails with [`SyncError::SyncInProgress`] without running `f`.
pub fn with_script_lock<L, T, F>(lock: &mut L, timeout: Duration, f: F) -> SyncResult<T>
where
    L: ScriptLock,
    F: FnOnce() -> SyncResult<T>,
{
    if !lock.try_lock(timeout) {
        tracing::warn!("Sync lock not acquired within {:?}", timeout);
        return Err(SyncError::SyncInProgress);
    }

    let _guard = LockGuard { lock };
    f()
}
