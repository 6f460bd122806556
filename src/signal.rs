//! Interrupt-safe binary signal.
//!
//! The "give" side may be called from interrupt context: it never blocks
//! and never allocates. The "take" side blocks a single worker thread until
//! a give arrives. Gives that arrive while nobody waits are latched, and
//! several gives before a take collapse into one, like a binary semaphore.
//!
//! On desktop builds the waiter is parked with `std::thread::park`; with the
//! `esp32` feature the signal is a FreeRTOS binary semaphore given with the
//! `FromISR` variant when called from an interrupt.

#[cfg(not(feature = "esp32"))]
use core::cell::RefCell;
#[cfg(not(feature = "esp32"))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(feature = "esp32"))]
use std::thread::{self, Thread};

#[cfg(not(feature = "esp32"))]
use critical_section::Mutex;

/// Binary signal from interrupt context to one worker thread.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use irq_io::IsrSignal;
///
/// let signal = Arc::new(IsrSignal::new());
/// let waiter = {
///     let signal = signal.clone();
///     thread::spawn(move || {
///         signal.bind_current();
///         signal.take();
///     })
/// };
///
/// signal.give();
/// waiter.join().unwrap();
/// ```
#[cfg(not(feature = "esp32"))]
pub struct IsrSignal {
    pending: AtomicBool,
    waiter: Mutex<RefCell<Option<Thread>>>,
}

#[cfg(not(feature = "esp32"))]
impl IsrSignal {
    /// Creates a signal with no pending give and no bound waiter.
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            waiter: Mutex::new(RefCell::new(None)),
        }
    }

    /// Binds the calling thread as the waiter, replacing any previous one.
    ///
    /// Must be called by the worker before its first [`take`](Self::take).
    pub fn bind_current(&self) {
        let current = thread::current();
        critical_section::with(|cs| *self.waiter.borrow_ref_mut(cs) = Some(current));
    }

    /// Forgets the bound waiter and drops any latched give.
    pub fn unbind(&self) {
        critical_section::with(|cs| *self.waiter.borrow_ref_mut(cs) = None);
        self.pending.store(false, Ordering::Release);
    }

    /// Latches the signal and wakes the waiter. Interrupt-safe.
    pub fn give(&self) {
        self.pending.store(true, Ordering::Release);
        critical_section::with(|cs| {
            if let Some(waiter) = self.waiter.borrow_ref(cs).as_ref() {
                waiter.unpark();
            }
        });
    }

    /// Blocks until the signal is given, then clears it.
    pub fn take(&self) {
        while !self.try_take() {
            thread::park();
        }
    }

    /// Clears and returns the latched state without blocking.
    pub fn try_take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Returns true if a give is latched and not yet taken.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Always true: the host signal needs no allocation.
    pub const fn is_valid(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "esp32"))]
impl Default for IsrSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "esp32")]
pub use crate::hal::esp32::IsrSignal;
