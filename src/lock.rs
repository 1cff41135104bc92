//! Poison-recovering lock guards.
//!
//! A panicked listener must not wedge the hook bus or the scheduler, so
//! poisoned locks are recovered with a warning instead of propagating.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(op, lock_kind = "rwlock.read", "Recovered from poisoned lock");
            poisoned.into_inner()
        }
    }
}

pub(crate) fn rw_write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(op, lock_kind = "rwlock.write", "Recovered from poisoned lock");
            poisoned.into_inner()
        }
    }
}

pub(crate) fn mutex_lock<'a, T>(lock: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(op, lock_kind = "mutex.lock", "Recovered from poisoned lock");
            poisoned.into_inner()
        }
    }
}
