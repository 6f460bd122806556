//! Shared configuration for encoders, interrupt lines, UART channels and timers.
//!
//! Uses `heapless::String` for worker names so the structs stay `no_std`
//! friendly while remaining ergonomic to build on desktop.
//!
//! Defaults mirror the firmware build knobs: a 5 ms encoder filter window,
//! UART1 at 115200 8N1, 1 KiB ring buffers and a 20-entry event queue.
//!
//! # Example
//!
//! ```rust
//! use irq_io::config::{Config, EncoderConfig, UartConfig};
//!
//! // Use defaults
//! let config = Config::default();
//!
//! // Or customize
//! let config = Config::default()
//!     .with_encoder(EncoderConfig::new(4, 5).with_debounce_ms(10))
//!     .with_uart(UartConfig::default().with_port(2).with_baud_rate(9600));
//! ```

use heapless::String as HString;

use crate::traits::{DataBits, Edge, FlowControl, Parity, PinId, Pull, StopBits, TimerUnit};

/// Maximum length of a worker thread name.
pub const MAX_NAME: usize = 32;

/// Type alias for worker names.
pub type NameString = HString<MAX_NAME>;

/// Create a NameString from a &str, truncating if too long
pub fn name_string(s: &str) -> NameString {
    let mut hs = NameString::new();
    let take = s.len().min(MAX_NAME);
    // Find valid UTF-8 boundary
    let valid_end = s
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= take)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete driver configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Rotary encoder configuration
    pub encoder: EncoderConfig,
    /// Serial channel configuration
    pub uart: UartConfig,
    /// Hardware timer configuration
    pub timer: TimerConfig,
}

impl Config {
    /// Set encoder configuration
    pub fn with_encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set UART configuration
    pub fn with_uart(mut self, uart: UartConfig) -> Self {
        self.uart = uart;
        self
    }

    /// Set timer configuration
    pub fn with_timer(mut self, timer: TimerConfig) -> Self {
        self.timer = timer;
        self
    }
}

// ============================================================================
// Worker Config
// ============================================================================

/// Background worker thread parameters
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerConfig {
    /// Thread name (shows up in task lists and panics)
    pub name: NameString,
    /// Stack size in bytes
    pub stack_size: usize,
}

impl WorkerConfig {
    /// Create a worker config with the given name and stack size
    pub fn new(name: &str, stack_size: usize) -> Self {
        Self {
            name: name_string(name),
            stack_size,
        }
    }

    /// Set the thread name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name_string(name);
        self
    }

    /// Set the stack size
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }
}

// ============================================================================
// Interrupt Config
// ============================================================================

/// Interrupt line configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterruptConfig {
    /// GPIO number
    pub pin: PinId,
    /// Enable the internal pull-up
    pub pull_up: bool,
    /// Enable the internal pull-down
    pub pull_down: bool,
    /// Trigger condition
    pub edge: Edge,
}

impl InterruptConfig {
    /// Create a config for `pin`: no pulls, any edge
    pub fn new(pin: PinId) -> Self {
        Self {
            pin,
            pull_up: false,
            pull_down: false,
            edge: Edge::Any,
        }
    }

    /// Set the pull resistors
    pub fn with_pull(mut self, pull_up: bool, pull_down: bool) -> Self {
        self.pull_up = pull_up;
        self.pull_down = pull_down;
        self
    }

    /// Set the trigger condition
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edge = edge;
        self
    }

    /// Combined pull setting
    pub fn pull(&self) -> Pull {
        Pull::from_flags(self.pull_up, self.pull_down)
    }
}

// ============================================================================
// Encoder Config
// ============================================================================

/// How the decoder observes the encoder lines
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EncoderMode {
    /// Falling edge on e2 raises an interrupt; a guard window debounces it
    #[default]
    Interrupt,
    /// Every state query samples both lines
    Polling,
}

/// Rotary encoder configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncoderConfig {
    /// Level line (sampled to pick the direction)
    pub e1_pin: PinId,
    /// Edge line (raises the interrupt in interrupt mode)
    pub e2_pin: PinId,
    /// Guard window after each transition in milliseconds
    pub debounce_ms: u32,
    /// Operating mode
    pub mode: EncoderMode,
    /// Guard-window worker thread parameters
    pub worker: WorkerConfig,
}

impl EncoderConfig {
    /// Default guard window in milliseconds
    pub const DEFAULT_DEBOUNCE_MS: u32 = 5;

    /// Create an interrupt-mode config for the given lines
    pub fn new(e1_pin: PinId, e2_pin: PinId) -> Self {
        Self {
            e1_pin,
            e2_pin,
            debounce_ms: Self::DEFAULT_DEBOUNCE_MS,
            mode: EncoderMode::Interrupt,
            worker: WorkerConfig::new("[Encoder Filter]", 2048),
        }
    }

    /// Set the guard window
    pub fn with_debounce_ms(mut self, ms: u32) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Set the operating mode
    pub fn with_mode(mut self, mode: EncoderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the filter worker parameters
    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Interrupt line settings for the edge line: pull-up, falling edge
    pub fn edge_line(&self) -> InterruptConfig {
        InterruptConfig::new(self.e2_pin)
            .with_pull(true, false)
            .with_edge(Edge::Falling)
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::new(6, 7)
    }
}

// ============================================================================
// UART Config
// ============================================================================

/// Receive interrupt thresholds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RxInterruptConfig {
    /// RX FIFO fill level that raises an interrupt
    pub rx_fifo_full_threshold: u8,
    /// Idle time (in symbols) before a partial FIFO is reported
    pub rx_timeout_threshold: u8,
    /// TX FIFO level that raises the empty interrupt
    pub tx_fifo_empty_threshold: u8,
}

impl Default for RxInterruptConfig {
    fn default() -> Self {
        Self {
            rx_fifo_full_threshold: 120,
            rx_timeout_threshold: 10,
            tx_fifo_empty_threshold: 10,
        }
    }
}

/// Serial channel configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UartConfig {
    /// UART peripheral number
    pub port: u8,
    /// TX pin (None = leave unchanged)
    pub tx_pin: Option<PinId>,
    /// RX pin (None = leave unchanged)
    pub rx_pin: Option<PinId>,
    /// RTS pin (None = leave unchanged)
    pub rts_pin: Option<PinId>,
    /// CTS pin (None = leave unchanged)
    pub cts_pin: Option<PinId>,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per frame
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Hardware flow control
    pub flow_control: FlowControl,
    /// Software (XON/XOFF) flow control
    pub sw_flow_control: bool,
    /// Driver receive ring size in bytes
    pub rx_buffer_size: usize,
    /// Driver transmit ring size in bytes
    pub tx_buffer_size: usize,
    /// Event queue depth
    pub event_queue_size: usize,
    /// Interrupt allocation flags passed to the driver
    pub interrupt_alloc_flags: i32,
    /// Receive interrupt thresholds
    pub rx_interrupt: RxInterruptConfig,
    /// Event worker thread parameters
    pub worker: WorkerConfig,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            port: 1,
            tx_pin: None,
            rx_pin: None,
            rts_pin: None,
            cts_pin: None,
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::Disabled,
            sw_flow_control: false,
            rx_buffer_size: 1024,
            tx_buffer_size: 1024,
            event_queue_size: 20,
            interrupt_alloc_flags: 0,
            rx_interrupt: RxInterruptConfig::default(),
            worker: WorkerConfig::new("[UART Channel]", 4096),
        }
    }
}

impl UartConfig {
    /// Set the UART peripheral number
    pub fn with_port(mut self, port: u8) -> Self {
        self.port = port;
        self
    }

    /// Set TX and RX pins
    pub fn with_pins(mut self, tx: PinId, rx: PinId) -> Self {
        self.tx_pin = Some(tx);
        self.rx_pin = Some(rx);
        self
    }

    /// Set RTS and CTS pins
    pub fn with_flow_pins(mut self, rts: PinId, cts: PinId) -> Self {
        self.rts_pin = Some(rts);
        self.cts_pin = Some(cts);
        self
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Set the frame format
    pub fn with_format(mut self, data_bits: DataBits, parity: Parity, stop_bits: StopBits) -> Self {
        self.data_bits = data_bits;
        self.parity = parity;
        self.stop_bits = stop_bits;
        self
    }

    /// Set hardware flow control
    pub fn with_flow_control(mut self, flow: FlowControl) -> Self {
        self.flow_control = flow;
        self
    }

    /// Enable or disable software flow control
    pub fn with_sw_flow_control(mut self, enabled: bool) -> Self {
        self.sw_flow_control = enabled;
        self
    }

    /// Set driver ring buffer sizes
    pub fn with_buffers(mut self, rx: usize, tx: usize) -> Self {
        self.rx_buffer_size = rx;
        self.tx_buffer_size = tx;
        self
    }

    /// Set the event queue depth
    pub fn with_event_queue_size(mut self, size: usize) -> Self {
        self.event_queue_size = size;
        self
    }

    /// Set the interrupt allocation flags
    pub fn with_interrupt_alloc_flags(mut self, flags: i32) -> Self {
        self.interrupt_alloc_flags = flags;
        self
    }

    /// Set the receive interrupt thresholds
    pub fn with_rx_interrupt(mut self, rx_interrupt: RxInterruptConfig) -> Self {
        self.rx_interrupt = rx_interrupt;
        self
    }

    /// Set the event worker parameters
    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }
}

// ============================================================================
// Timer Config
// ============================================================================

/// Hardware timer configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimerConfig {
    /// Timer unit to use
    pub unit: TimerUnit,
    /// Alarm period in microseconds
    pub period_us: u32,
    /// Interrupt allocation flags
    pub interrupt_alloc_flags: i32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            unit: TimerUnit::Group0Timer0,
            period_us: 1000,
            interrupt_alloc_flags: 0,
        }
    }
}

impl TimerConfig {
    /// Set the timer unit
    pub fn with_unit(mut self, unit: TimerUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Set the alarm period
    pub fn with_period_us(mut self, us: u32) -> Self {
        self.period_us = us;
        self
    }

    /// Set the interrupt allocation flags
    pub fn with_interrupt_alloc_flags(mut self, flags: i32) -> Self {
        self.interrupt_alloc_flags = flags;
        self
    }
}
