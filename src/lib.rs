//! # irq-io
//!
//! Interrupt-driven I/O building blocks for ESP32-class firmware: a GPIO
//! interrupt source, a debounced quadrature decoder, an event-queue-driven
//! UART channel with synchronized teardown, and a per-unit hardware timer.
//!
//! ## Features
//!
//! - **Interrupt sources**: edge-triggered GPIO lines with idempotent
//!   enable/disable and a single registered reaction
//! - **Debounced decoding**: falling-edge decoding with a guard window
//!   enforced by a background filter worker, or a polling detector for
//!   boards without a spare interrupt line
//! - **Event-queue channels**: a worker thread drains a bounded driver event
//!   queue, recovers from overflows locally and hands payloads to a consumer
//! - **Clean shutdown**: a lock + condition handshake guarantees the worker
//!   has parked before driver resources are released
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware abstractions (GPIO, UART driver + event queue, timer, delay)
//! - `irq` - Interrupt hub, sources and reactions
//! - `encoder` - Quadrature decoder (interrupt and polling modes)
//! - `channel` - UART event-queue channel
//! - `lifecycle` - Shutdown handshake
//! - `timer` - Per-unit hardware timers
//! - `hal` - Concrete implementations (mock for testing, esp32 for hardware)
//!
//! ## Example
//!
//! ```rust
//! use irq_io::{
//!     hal::{MockDelay, MockGpio},
//!     Decoder, DecoderState, EncoderConfig, IrqHub,
//! };
//!
//! let hub = IrqHub::leak(MockGpio::new());
//! let delay = MockDelay::immediate();
//! let decoder = Decoder::new(hub, &EncoderConfig::new(4, 5), delay).unwrap();
//!
//! // Encoder turned with the level line high
//! hub.hal().set_level(4, true);
//! hub.hal().trigger_edge(5);
//! assert_eq!(decoder.state(), DecoderState::TurnedLeft);
//!
//! decoder.reset_state();
//! assert_eq!(decoder.state(), DecoderState::Idle);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

#[macro_use]
mod diag;

/// Shared configuration for encoders, interrupt lines, UART channels and timers.
pub mod config;
/// Quadrature decoder with debounce filtering.
pub mod encoder;
/// Error types for construction and driver initialization.
pub mod error;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Interrupt hub, interrupt sources and reactions.
pub mod irq;
/// Fixed-capacity arenas keyed by index.
pub mod registry;
/// Core traits for hardware abstraction.
pub mod traits;

/// UART event-queue channel with a background worker.
#[cfg(feature = "std")]
pub mod channel;
/// Shutdown handshake between a worker and its owner.
#[cfg(feature = "std")]
pub mod lifecycle;
/// Interrupt-safe binary signal for waking a worker thread.
#[cfg(feature = "std")]
pub mod signal;
/// Per-unit hardware timers with lazy, init-once construction.
#[cfg(feature = "std")]
pub mod timer;

// Re-exports for convenience
pub use config::{
    Config, EncoderConfig, EncoderMode, InterruptConfig, RxInterruptConfig, TimerConfig,
    UartConfig, WorkerConfig,
};
pub use encoder::{poll_step, DecoderState};
pub use error::{ConfigError, DriverError};
pub use irq::{InterruptSource, IrqHub, IrqStats, IrqToken, Reaction};
pub use traits::{
    BlockingDelay, DataBits, Edge, Event, EventQueue, FlowControl, GpioHal, HalError, Parity,
    PinId, Pull, StopBits, TimerUnit, UartDriver,
};

#[cfg(feature = "std")]
pub use channel::{ChannelConsumer, ChannelStats, StatsSnapshot, TxOutcome, UartChannel};
#[cfg(feature = "std")]
pub use encoder::{Decoder, EncoderCell};
#[cfg(feature = "std")]
pub use lifecycle::{ExitNotice, ShutdownHandshake};
#[cfg(feature = "std")]
pub use signal::IsrSignal;
#[cfg(feature = "std")]
pub use timer::{Timer, TimerBank, TimerReaction};
#[cfg(feature = "std")]
pub use traits::{StdDelay, TimerHal};
