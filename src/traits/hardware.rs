//! Hardware abstraction traits for GPIO lines, interrupts and delays.
//!
//! This module defines the pin-level interfaces the interrupt core needs
//! from the platform (ESP-IDF, desktop mocks, etc.).
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`GpioHal`] | Pin configuration, level reads, per-pin interrupt control |
//! | [`BlockingDelay`] | Sleep used by background workers |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`]. For ESP32 hardware, use the
//! implementations from `hal::esp32` (requires `esp32` feature).
//!
//! # Example
//!
//! ```rust
//! use irq_io::traits::{GpioHal, Pull};
//! use irq_io::hal::MockGpio;
//!
//! let gpio = MockGpio::new();
//! gpio.configure_input(4, Pull::Up).unwrap();
//!
//! gpio.set_level(4, true);
//! assert!(gpio.is_high(4));
//! ```

use core::fmt;

use crate::irq::IrqHub;

/// GPIO number as used by the platform.
pub type PinId = u32;

/// Pull resistor configuration of an input pin.
///
/// # Default
///
/// Defaults to [`Floating`](Self::Floating).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Pull {
    /// No pull resistor.
    #[default]
    Floating,
    /// Pull-up only.
    Up,
    /// Pull-down only.
    Down,
    /// Both pull-up and pull-down enabled.
    UpDown,
}

impl Pull {
    /// Builds a pull setting from separate pull-up / pull-down flags.
    ///
    /// # Examples
    ///
    /// ```
    /// use irq_io::Pull;
    ///
    /// assert_eq!(Pull::from_flags(true, false), Pull::Up);
    /// assert_eq!(Pull::from_flags(false, false), Pull::Floating);
    /// ```
    pub const fn from_flags(pull_up: bool, pull_down: bool) -> Self {
        match (pull_up, pull_down) {
            (false, false) => Pull::Floating,
            (true, false) => Pull::Up,
            (false, true) => Pull::Down,
            (true, true) => Pull::UpDown,
        }
    }

    /// Returns true if the pull-up resistor is enabled.
    #[inline]
    pub const fn pull_up(&self) -> bool {
        matches!(self, Pull::Up | Pull::UpDown)
    }

    /// Returns true if the pull-down resistor is enabled.
    #[inline]
    pub const fn pull_down(&self) -> bool {
        matches!(self, Pull::Down | Pull::UpDown)
    }
}

/// Signal condition that triggers a pin interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Edge {
    /// Low-to-high transition.
    Rising,
    /// High-to-low transition.
    Falling,
    /// Either transition.
    #[default]
    Any,
    /// Level-triggered while low.
    LowLevel,
    /// Level-triggered while high.
    HighLevel,
}

/// Opaque error code reported by the platform HAL.
///
/// On ESP-IDF this carries the `esp_err_t` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HalError {
    code: i32,
}

impl HalError {
    /// Generic failure code (`ESP_FAIL`).
    pub const FAIL: HalError = HalError { code: -1 };

    /// Wraps a raw platform error code.
    #[inline]
    pub const fn new(code: i32) -> Self {
        Self { code }
    }

    /// Returns the raw platform error code.
    #[inline]
    pub const fn code(&self) -> i32 {
        self.code
    }
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HAL error {:#x}", self.code)
    }
}

/// GPIO and pin-interrupt abstraction.
///
/// All methods take `&self`: the HAL is shared between task context and the
/// interrupt path, so implementations must be `Sync` and keep any internal
/// bookkeeping lock-free or very short.
///
/// # Implementation Notes
///
/// - `is_high`, `enable_interrupt` and `disable_interrupt` are called from
///   interrupt context and must not block
/// - `install_isr` routes edges on `pin` to [`IrqHub::handle_edge`]; edges on
///   a pin whose interrupt is disabled must not be delivered
/// - `reset_pin` returns the pin to its power-on state
pub trait GpioHal: Send + Sync + Sized + 'static {
    /// Configures `pin` as a plain input.
    fn configure_input(&self, pin: PinId, pull: Pull) -> Result<(), HalError>;

    /// Configures `pin` as an input that raises interrupts on `edge`.
    ///
    /// The pin interrupt must start disabled.
    fn configure_interrupt(&self, pin: PinId, pull: Pull, edge: Edge) -> Result<(), HalError>;

    /// Returns true if `pin` currently reads high.
    fn is_high(&self, pin: PinId) -> bool;

    /// Installs the edge handler for `pin`, forwarding to `router`.
    fn install_isr(&self, pin: PinId, router: &'static IrqHub<Self>) -> Result<(), HalError>;

    /// Removes the edge handler for `pin`.
    fn remove_isr(&self, pin: PinId);

    /// Unmasks the interrupt of `pin`.
    fn enable_interrupt(&self, pin: PinId);

    /// Masks the interrupt of `pin`.
    fn disable_interrupt(&self, pin: PinId);

    /// Returns `pin` to its reset state.
    fn reset_pin(&self, pin: PinId);
}

/// Blocking delay used by background workers.
///
/// Unlike an async delay, this parks the calling thread; it is only ever
/// called from worker threads, never from interrupt context.
pub trait BlockingDelay: Send + 'static {
    /// Blocks the calling thread for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// [`BlockingDelay`] backed by `std::thread::sleep`.
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl BlockingDelay for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
