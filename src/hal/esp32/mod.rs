//! ESP-IDF hardware abstraction layer.
//!
//! Implements the crate's HAL traits on top of the raw ESP-IDF drivers:
//!
//! - [`Esp32Gpio`]: `gpio_config` plus the shared GPIO ISR service
//! - [`Esp32Uart`]: the UART driver and its FreeRTOS event queue
//! - [`Esp32Timer`]: the general-purpose timer groups
//! - [`IsrSignal`]: a FreeRTOS binary semaphore, given from ISR context
//!
//! # Pin Assignments
//!
//! See the [`pins`] module for the default wiring used by `esp32_main`.

mod gpio;
mod signal;
mod timer;
mod uart;

pub use gpio::Esp32Gpio;
pub use signal::IsrSignal;
pub use timer::Esp32Timer;
pub use uart::{Esp32EventQueue, Esp32Uart};

use esp_idf_hal::sys;

use crate::traits::HalError;

/// Maps an `esp_err_t` to a `Result`.
pub(crate) fn check(code: sys::esp_err_t) -> Result<(), HalError> {
    if code == sys::ESP_OK as sys::esp_err_t {
        Ok(())
    } else {
        Err(HalError::new(code))
    }
}

/// Default pin assignments.
pub mod pins {
    use crate::traits::PinId;

    // =========================================================================
    // Rotary Encoder
    // =========================================================================

    /// Level line (sampled on each edge)
    pub const ENC_E1: PinId = 6;

    /// Edge line (falling-edge interrupt)
    pub const ENC_E2: PinId = 7;

    // =========================================================================
    // Serial Channel
    // =========================================================================

    /// UART1 TX
    pub const UART_TX: PinId = 21;

    /// UART1 RX
    pub const UART_RX: PinId = 20;
}
