use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

// A panicking processor must not wedge the harness: poisoned locks are
// recovered, the data behind them is append-only or replaced atomically.

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("{what} read lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("{what} write lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

pub(crate) fn lock<'a, T>(lock: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("{what} lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
