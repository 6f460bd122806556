//! Serial driver and event queue abstractions.
//!
//! The UART driver layer (ISR plus ring buffers) is external. What the
//! channel core needs from it is:
//!
//! - a bounded [`EventQueue`] of classified [`Event`]s with blocking and
//!   non-blocking receive
//! - byte-level receive, transmit and input flush through [`UartDriver`]

use crate::config::UartConfig;
use crate::error::DriverError;

/// Number of data bits per UART frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataBits {
    /// 5 data bits.
    Five,
    /// 6 data bits.
    Six,
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity mode of a UART frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Even parity.
    Even,
    /// Odd parity.
    Odd,
}

/// Number of stop bits of a UART frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    /// One stop bit.
    #[default]
    One,
    /// One and a half stop bits.
    OneAndHalf,
    /// Two stop bits.
    Two,
}

/// Hardware flow control lines in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlowControl {
    /// No hardware flow control.
    #[default]
    Disabled,
    /// RTS only.
    Rts,
    /// CTS only.
    Cts,
    /// Both RTS and CTS.
    RtsCts,
}

/// Classified event produced by the UART driver layer.
///
/// Events are consumed exactly once, in the order the driver enqueued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// `len` bytes are waiting in the receive buffer.
    DataReady(usize),
    /// The hardware RX FIFO overflowed.
    FifoOverflow,
    /// The driver's receive ring buffer is full.
    BufferFull,
    /// A break condition was detected on RX.
    Break,
    /// A received byte failed the parity check.
    ParityError,
    /// A received byte had a framing error.
    FrameError,
    /// An event code this crate does not classify.
    Other(u32),
    /// Shutdown sentinel: the worker acknowledges and exits.
    ///
    /// Only the channel's teardown path posts this.
    Shutdown,
}

impl Event {
    /// Returns true for events recovered by flushing input and draining the queue.
    ///
    /// # Examples
    ///
    /// ```
    /// use irq_io::Event;
    ///
    /// assert!(Event::FifoOverflow.needs_resync());
    /// assert!(Event::BufferFull.needs_resync());
    /// assert!(!Event::ParityError.needs_resync());
    /// ```
    #[inline]
    pub const fn needs_resync(&self) -> bool {
        matches!(self, Event::FifoOverflow | Event::BufferFull)
    }

    /// Returns true for line errors that are only reported.
    #[inline]
    pub const fn is_line_error(&self) -> bool {
        matches!(self, Event::Break | Event::ParityError | Event::FrameError)
    }
}

/// Bounded FIFO of driver events.
///
/// The driver side enqueues from interrupt context; the channel worker is
/// the only receiver.
pub trait EventQueue: Send + Sync + 'static {
    /// Blocks until an event is available and returns it.
    fn recv(&self) -> Event;

    /// Takes the oldest event if one is queued, without blocking.
    fn try_recv(&self) -> Option<Event>;

    /// Enqueues `event` from task context, blocking while the queue is full.
    fn send(&self, event: Event);
}

/// UART driver abstraction.
///
/// # Implementation Notes
///
/// - `install` programs line parameters, pins, flow control and interrupt
///   thresholds, then returns the driver's event queue
/// - `read` and `write` are best-effort and return the byte count actually
///   moved
/// - `uninstall` is only called after the channel worker has exited
pub trait UartDriver: Send + Sync + 'static {
    /// Event queue type handed out by [`install`](Self::install).
    type Queue: EventQueue;

    /// Programs the peripheral and installs the driver.
    fn install(&self, config: &UartConfig) -> Result<Self::Queue, DriverError>;

    /// Removes the driver and frees its buffers.
    fn uninstall(&self);

    /// Reads up to `buf.len()` received bytes into `buf`.
    fn read(&self, buf: &mut [u8]) -> usize;

    /// Queues `data` for transmission, returning how many bytes were accepted.
    fn write(&self, data: &[u8]) -> usize;

    /// Discards everything in the receive path.
    fn flush_input(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resync_events() {
        assert!(Event::FifoOverflow.needs_resync());
        assert!(Event::BufferFull.needs_resync());
        assert!(!Event::DataReady(3).needs_resync());
        assert!(!Event::Shutdown.needs_resync());
    }

    #[test]
    fn line_error_events() {
        assert!(Event::Break.is_line_error());
        assert!(Event::ParityError.is_line_error());
        assert!(Event::FrameError.is_line_error());
        assert!(!Event::FifoOverflow.is_line_error());
        assert!(!Event::Other(27).is_line_error());
    }
}
