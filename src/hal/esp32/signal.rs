//! FreeRTOS binary semaphore used as the ISR-to-worker signal.

use core::ptr;

use esp_idf_hal::interrupt;
use esp_idf_hal::sys;

const TAG: &str = "[Signal]";

const QUEUE_TYPE_BINARY_SEMAPHORE: u8 = 3;
const SEND_TO_BACK: sys::BaseType_t = 0;
const MAX_DELAY: sys::TickType_t = sys::TickType_t::MAX;

/// Binary signal from interrupt context to one worker task.
///
/// `give` picks the `FromISR` variant when called from an interrupt and
/// yields if it woke a higher-priority task.
pub struct IsrSignal {
    handle: sys::QueueHandle_t,
}

// The semaphore handle is usable from any task and from ISRs.
unsafe impl Send for IsrSignal {}
unsafe impl Sync for IsrSignal {}

impl IsrSignal {
    /// Creates an empty semaphore.
    ///
    /// Allocation failure is logged and leaves the signal unusable; check
    /// [`is_valid`](Self::is_valid) before relying on it.
    pub fn new() -> Self {
        let handle = unsafe { sys::xQueueGenericCreate(1, 0, QUEUE_TYPE_BINARY_SEMAPHORE) };
        if handle.is_null() {
            diag_error!(TAG, "semaphore allocation failed");
        }
        Self { handle }
    }

    /// Returns true if the semaphore was allocated.
    ///
    /// An invalid signal never blocks in `take`, so a worker waiting on it
    /// would spin.
    pub fn is_valid(&self) -> bool {
        !self.handle.is_null()
    }

    /// No-op: any task may take a FreeRTOS semaphore.
    pub fn bind_current(&self) {}

    /// Drops a latched give.
    pub fn unbind(&self) {
        while self.try_take() {}
    }

    /// Releases the waiter. Safe to call from interrupt context.
    pub fn give(&self) {
        if self.handle.is_null() {
            return;
        }
        if interrupt::active() {
            let mut woken: sys::BaseType_t = 0;
            unsafe {
                sys::xQueueGiveFromISR(self.handle, &mut woken);
            }
            if woken != 0 {
                interrupt::do_yield();
            }
        } else {
            unsafe {
                sys::xQueueGenericSend(self.handle, ptr::null(), 0, SEND_TO_BACK);
            }
        }
    }

    /// Blocks until a give arrives.
    pub fn take(&self) {
        if self.handle.is_null() {
            return;
        }
        unsafe {
            sys::xQueueSemaphoreTake(self.handle, MAX_DELAY);
        }
    }

    /// Consumes a pending give without blocking.
    pub fn try_take(&self) -> bool {
        !self.handle.is_null() && unsafe { sys::xQueueSemaphoreTake(self.handle, 0) } != 0
    }

    /// Returns true if a give is latched.
    pub fn is_pending(&self) -> bool {
        !self.handle.is_null() && unsafe { sys::uxQueueMessagesWaiting(self.handle) } > 0
    }
}

impl Default for IsrSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IsrSignal {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { sys::vQueueDelete(self.handle) };
        }
    }
}
