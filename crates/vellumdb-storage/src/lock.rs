//! Explicit collection-level read/write lock.
//!
//! Transactions acquire and release collection locks at operation
//! granularity, not lexical scope, so the usual guard-based lock types do
//! not fit. This is a plain readers/writer lock with explicit unlock,
//! tracked by the transaction state that took it.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct LockState {
    readers: u32,
    writer: bool,
}

/// A readers/writer lock with explicit acquire and release.
#[derive(Debug, Default)]
pub struct CollectionLock {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl CollectionLock {
    /// Create an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for reading, blocking while a writer holds it.
    pub fn lock_read(&self) {
        let mut state = self.state.lock();
        while state.writer {
            self.changed.wait(&mut state);
        }
        state.readers += 1;
    }

    /// Acquire the lock for writing, blocking while anyone holds it.
    pub fn lock_write(&self) {
        let mut state = self.state.lock();
        while state.writer || state.readers > 0 {
            self.changed.wait(&mut state);
        }
        state.writer = true;
    }

    /// Release a read acquisition.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held for reading; unbalanced unlocks are a
    /// programming error.
    pub fn unlock_read(&self) {
        let mut state = self.state.lock();
        assert!(state.readers > 0, "unlock_read without matching lock_read");
        state.readers -= 1;
        if state.readers == 0 {
            self.changed.notify_all();
        }
    }

    /// Release a write acquisition.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held for writing.
    pub fn unlock_write(&self) {
        let mut state = self.state.lock();
        assert!(state.writer, "unlock_write without matching lock_write");
        state.writer = false;
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_readers_share_writers_exclude() {
        let lock = Arc::new(CollectionLock::new());
        lock.lock_read();
        lock.lock_read();
        lock.unlock_read();
        lock.unlock_read();

        lock.lock_write();
        let contender = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            contender.lock_read();
            contender.unlock_read();
        });
        lock.unlock_write();
        handle.join().expect("reader thread");
    }
}
