//! Trait definitions for hardware abstraction.
//!
//! This module defines the core abstractions that allow irq-io to:
//! - Run on different hardware (ESP32, desktop mock)
//! - Drive interrupt sources, UART drivers and timers through one interface
//!
//! # Submodules
//!
//! - `hardware`: GPIO lines, pin interrupts, blocking delay
//! - `serial`: UART driver, event queue and line-format enums
//! - `timer`: General-purpose hardware timers
//!
//! # Hardware Abstraction
//!
//! The key hardware traits are:
//!
//! - [`GpioHal`]: Pin configuration, level reads and per-pin interrupts
//! - [`UartDriver`] / [`EventQueue`]: Byte I/O plus the driver's event queue
//! - [`TimerHal`]: Alarm timers (requires `std`)
//! - [`BlockingDelay`]: Sleep for worker threads

pub mod hardware;
pub mod serial;
pub mod timer;

pub use hardware::*;
pub use serial::*;
pub use timer::*;
