//! Shutdown handshake between a worker and its owner.
//!
//! The owner must not free resources a worker still uses. With the
//! handshake, the owner posts a shutdown sentinel to the worker and waits
//! until the worker acknowledges it. The sentinel is posted while holding
//! the handshake lock, so the acknowledgement cannot slip in between posting
//! and waiting.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{mpsc, Arc};
//! use std::thread;
//! use irq_io::ShutdownHandshake;
//!
//! let handshake = Arc::new(ShutdownHandshake::new());
//! let (tx, rx) = mpsc::channel::<&str>();
//!
//! let worker = {
//!     let handshake = handshake.clone();
//!     thread::spawn(move || {
//!         while let Ok(msg) = rx.recv() {
//!             if msg == "shutdown" {
//!                 handshake.acknowledge();
//!                 return;
//!             }
//!         }
//!     })
//! };
//!
//! handshake.initiate(|| tx.send("shutdown").unwrap());
//! assert!(handshake.is_acknowledged());
//! worker.join().unwrap();
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Lock + condition pair for "worker has seen shutdown" notification.
#[derive(Debug, Default)]
pub struct ShutdownHandshake {
    acknowledged: Mutex<bool>,
    cond: Condvar,
}

impl ShutdownHandshake {
    /// Creates an armed handshake.
    pub const fn new() -> Self {
        Self {
            acknowledged: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Clears a previous acknowledgement so the handshake can run again.
    ///
    /// Call before starting a new worker.
    pub fn arm(&self) {
        *self.lock() = false;
    }

    /// Posts the sentinel with `post` and blocks until acknowledged.
    ///
    /// `post` runs while the lock is held. Returns immediately if the worker
    /// already acknowledged (for example because it exited early).
    pub fn initiate(&self, post: impl FnOnce()) {
        let guard = self.lock();
        if *guard {
            return;
        }
        post();
        let _guard = self
            .cond
            .wait_while(guard, |acknowledged| !*acknowledged)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Marks the sentinel as seen and wakes the initiator.
    ///
    /// Called by the worker right before it returns.
    pub fn acknowledge(&self) {
        *self.lock() = true;
        self.cond.notify_all();
    }

    /// Returns true once the worker has acknowledged.
    pub fn is_acknowledged(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.acknowledged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Acknowledges a handshake when dropped.
///
/// Held by a worker for its whole run, so the initiator is released even if
/// the worker unwinds out of a panicking consumer.
#[must_use = "the notice acknowledges when dropped"]
pub struct ExitNotice<'a> {
    handshake: &'a ShutdownHandshake,
}

impl<'a> ExitNotice<'a> {
    /// Ties the notice to `handshake`.
    pub fn new(handshake: &'a ShutdownHandshake) -> Self {
        Self { handshake }
    }
}

impl Drop for ExitNotice<'_> {
    fn drop(&mut self) {
        self.handshake.acknowledge();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn initiate_waits_for_acknowledge() {
        let handshake = Arc::new(ShutdownHandshake::new());
        let worker_done = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<()>();

        let worker = {
            let handshake = handshake.clone();
            let worker_done = worker_done.clone();
            thread::spawn(move || {
                rx.recv().unwrap();
                thread::sleep(Duration::from_millis(20));
                worker_done.store(true, Ordering::SeqCst);
                handshake.acknowledge();
            })
        };

        handshake.initiate(|| tx.send(()).unwrap());
        assert!(worker_done.load(Ordering::SeqCst));
        worker.join().unwrap();
    }

    #[test]
    fn initiate_after_acknowledge_returns_without_posting() {
        let handshake = ShutdownHandshake::new();
        handshake.acknowledge();
        let mut posted = false;
        handshake.initiate(|| posted = true);
        assert!(!posted);
    }

    #[test]
    fn arm_resets_for_reuse() {
        let handshake = ShutdownHandshake::new();
        handshake.acknowledge();
        assert!(handshake.is_acknowledged());
        handshake.arm();
        assert!(!handshake.is_acknowledged());
    }

    #[test]
    fn exit_notice_acknowledges_on_panic() {
        let handshake = Arc::new(ShutdownHandshake::new());
        let (tx, rx) = mpsc::channel::<()>();
        let worker = {
            let handshake = handshake.clone();
            thread::spawn(move || {
                let _notice = ExitNotice::new(&handshake);
                rx.recv().unwrap();
                panic!("consumer failed");
            })
        };

        handshake.initiate(|| tx.send(()).unwrap());
        assert!(handshake.is_acknowledged());
        assert!(worker.join().is_err());
    }
}
