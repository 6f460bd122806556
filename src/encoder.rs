//! Quadrature decoder with debounce filtering.
//!
//! A two-line mechanical encoder reports each detent as a falling edge on
//! the edge line (e2). The level of the other line (e1) at that moment gives
//! the direction: high is [`DecoderState::TurnedLeft`], low is
//! [`DecoderState::TurnedRight`].
//!
//! Contacts bounce, so in interrupt mode the edge line is masked from the
//! moment a transition is committed until a guard window of
//! `debounce_ms` has elapsed. A dedicated filter worker owns that window:
//! the reaction gives it a signal, it sleeps, and it unmasks the line.
//!
//! Boards without a spare interrupt line use polling mode instead: every
//! [`Decoder::state`] call samples both lines and runs a two-phase detector
//! (see [`poll_step`]).
//!
//! The committed state is sticky. It only returns to
//! [`DecoderState::Idle`] through [`Decoder::reset_state`].

#[cfg(feature = "std")]
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
#[cfg(feature = "std")]
use std::thread::{self, JoinHandle};

#[cfg(feature = "std")]
use crate::config::{EncoderConfig, EncoderMode, WorkerConfig};
#[cfg(feature = "std")]
use crate::error::ConfigError;
#[cfg(feature = "std")]
use crate::irq::{InterruptSource, IrqHub, IrqStats, IrqToken, Reaction};
#[cfg(feature = "std")]
use crate::signal::IsrSignal;
#[cfg(feature = "std")]
use crate::traits::{BlockingDelay, GpioHal, PinId, Pull};

#[cfg(feature = "std")]
const TAG: &str = "[Encoder]";

/// Direction last committed by the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DecoderState {
    /// No transition since construction or the last reset.
    #[default]
    Idle = 0,
    /// Edge seen with the level line high.
    TurnedLeft = 1,
    /// Edge seen with the level line low.
    TurnedRight = 2,
}

impl DecoderState {
    /// Decodes the atomic representation. Unknown values read as `Idle`.
    #[inline]
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => DecoderState::TurnedLeft,
            2 => DecoderState::TurnedRight,
            _ => DecoderState::Idle,
        }
    }

    /// Returns the atomic representation.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true for either turned state.
    #[inline]
    pub const fn is_turned(self) -> bool {
        !matches!(self, DecoderState::Idle)
    }
}

/// One sample of the polling detector.
///
/// Takes the current `armed` flag and both line levels, and returns the new
/// flag plus the state to commit, if any.
///
/// - Disarmed: both lines high arms the detector (rest position).
/// - Armed: e1 high with e2 low commits `TurnedLeft`; both low commits
///   `TurnedRight`. Either commit disarms until both lines are high again.
///   Any other sample keeps waiting.
///
/// A jump straight from both-low to both-high while disarmed only re-arms;
/// no transition is recorded for it.
///
/// # Examples
///
/// ```
/// use irq_io::encoder::poll_step;
/// use irq_io::DecoderState;
///
/// let (armed, _) = poll_step(false, true, true);
/// assert!(armed);
/// assert_eq!(poll_step(armed, true, false), (false, Some(DecoderState::TurnedLeft)));
/// ```
#[inline]
pub const fn poll_step(armed: bool, e1_high: bool, e2_high: bool) -> (bool, Option<DecoderState>) {
    if !armed {
        return (e1_high && e2_high, None);
    }
    match (e1_high, e2_high) {
        (true, false) => (false, Some(DecoderState::TurnedLeft)),
        (false, false) => (false, Some(DecoderState::TurnedRight)),
        _ => (true, None),
    }
}

// ============================================================================
// Interrupt-mode cell
// ============================================================================

/// Decoder state shared with interrupt context.
///
/// Lives in the hub's encoder arena so the edge reaction can reach it
/// through its token.
#[cfg(feature = "std")]
pub struct EncoderCell {
    state: AtomicU8,
    e1_pin: AtomicU32,
    source: AtomicUsize,
    retired: AtomicBool,
    guard: IsrSignal,
}

#[cfg(feature = "std")]
impl Default for EncoderCell {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(DecoderState::Idle.as_u8()),
            e1_pin: AtomicU32::new(0),
            source: AtomicUsize::new(usize::MAX),
            retired: AtomicBool::new(false),
            guard: IsrSignal::new(),
        }
    }
}

#[cfg(feature = "std")]
impl EncoderCell {
    /// Last committed state.
    #[inline]
    pub fn state(&self) -> DecoderState {
        DecoderState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn commit(&self, state: DecoderState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn bind(&self, e1_pin: PinId, source: IrqToken) {
        self.commit(DecoderState::Idle);
        self.e1_pin.store(e1_pin, Ordering::Release);
        self.source.store(source.index(), Ordering::Release);
        self.retired.store(false, Ordering::Release);
    }

    fn source(&self) -> IrqToken {
        IrqToken::new(self.source.load(Ordering::Acquire))
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.guard.give();
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.commit(DecoderState::Idle);
        self.source.store(usize::MAX, Ordering::Release);
        self.retired.store(false, Ordering::Release);
        self.guard.unbind();
    }
}

/// Edge reaction: commit the direction, mask the line, start the guard window.
#[cfg(feature = "std")]
fn on_edge<H: GpioHal>(hub: &IrqHub<H>, token: IrqToken) {
    let Some(cell) = hub.encoders().claimed(token.index()) else {
        return;
    };
    let e1 = cell.e1_pin.load(Ordering::Acquire);
    let state = if hub.hal().is_high(e1) {
        DecoderState::TurnedLeft
    } else {
        DecoderState::TurnedRight
    };
    cell.commit(state);
    hub.disable_source(cell.source());
    cell.guard.give();
}

/// Filter worker body: one guard window per give.
#[cfg(feature = "std")]
fn guard_loop<H: GpioHal, D: BlockingDelay>(
    hub: &'static IrqHub<H>,
    index: usize,
    debounce_ms: u32,
    mut delay: D,
) {
    let cell = hub.encoders().get(index);
    cell.guard.bind_current();
    loop {
        cell.guard.take();
        if cell.is_retired() {
            break;
        }
        delay.delay_ms(debounce_ms);
        if cell.is_retired() {
            break;
        }
        hub.enable_source(cell.source());
    }
}

#[cfg(feature = "std")]
fn spawn_worker<F>(worker: &WorkerConfig, body: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(worker.name.as_str().into())
        .stack_size(worker.stack_size)
        .spawn(body)
}

// ============================================================================
// Decoder
// ============================================================================

#[cfg(feature = "std")]
enum Mode<H: GpioHal> {
    Interrupt {
        cell: usize,
        source: Option<InterruptSource<H>>,
        worker: Option<JoinHandle<()>>,
    },
    Polling {
        state: AtomicU8,
        armed: AtomicBool,
    },
}

/// Two-line quadrature decoder.
///
/// # Example
///
/// ```rust
/// use irq_io::hal::{MockDelay, MockGpio};
/// use irq_io::{Decoder, DecoderState, EncoderConfig, EncoderMode, IrqHub};
///
/// let hub = IrqHub::leak(MockGpio::new());
/// let config = EncoderConfig::new(4, 5).with_mode(EncoderMode::Polling);
/// let decoder = Decoder::new(hub, &config, MockDelay::immediate()).unwrap();
///
/// // Rest position, then e2 drops while e1 stays high
/// hub.hal().set_level(4, true);
/// hub.hal().set_level(5, true);
/// assert_eq!(decoder.state(), DecoderState::Idle);
/// hub.hal().set_level(5, false);
/// assert_eq!(decoder.state(), DecoderState::TurnedLeft);
/// ```
#[cfg(feature = "std")]
pub struct Decoder<H: GpioHal> {
    hub: &'static IrqHub<H>,
    e1_pin: PinId,
    e2_pin: PinId,
    mode: Mode<H>,
}

#[cfg(feature = "std")]
impl<H: GpioHal> Decoder<H> {
    /// Builds a decoder in the mode named by `config.mode`.
    ///
    /// `delay` paces the guard window in interrupt mode and is unused in
    /// polling mode.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from claiming the lines, the arenas or the filter
    /// worker. Nothing is left claimed on failure.
    pub fn new<D: BlockingDelay>(
        hub: &'static IrqHub<H>,
        config: &EncoderConfig,
        delay: D,
    ) -> Result<Self, ConfigError> {
        match config.mode {
            EncoderMode::Interrupt => Self::interrupt(hub, config, delay),
            EncoderMode::Polling => Self::polling(hub, config),
        }
    }

    /// Builds an interrupt-mode decoder.
    ///
    /// e1 becomes a pulled-up input, e2 a pulled-up falling-edge interrupt
    /// source, and a filter worker is started. The source is enabled last.
    ///
    /// Fails with [`ConfigError::PinBusy`] if e1 is held by an interrupt
    /// source or equals e2.
    pub fn interrupt<D: BlockingDelay>(
        hub: &'static IrqHub<H>,
        config: &EncoderConfig,
        delay: D,
    ) -> Result<Self, ConfigError> {
        let e1_pin = config.e1_pin;
        if e1_pin == config.e2_pin || hub.pin_claimed(e1_pin) {
            return Err(ConfigError::PinBusy(e1_pin));
        }
        hub.hal()
            .configure_input(e1_pin, Pull::Up)
            .map_err(|source| ConfigError::InvalidPin { pin: e1_pin, source })?;

        let index = hub.encoders().claim().ok_or(ConfigError::NoFreeSlot)?;
        let cell = hub.encoders().get(index);
        if !cell.guard.is_valid() {
            diag_error!(TAG, "guard signal unavailable");
            hub.encoders().release(index);
            return Err(ConfigError::SignalUnavailable);
        }

        let source = match InterruptSource::configure(hub, &config.edge_line()) {
            Ok(source) => source,
            Err(e) => {
                cell.clear();
                hub.encoders().release(index);
                return Err(e);
            }
        };
        cell.bind(e1_pin, source.token());
        source.set_reaction(Reaction::new(on_edge::<H>, IrqToken::new(index)));

        let debounce_ms = config.debounce_ms;
        let worker = match spawn_worker(&config.worker, move || {
            guard_loop(hub, index, debounce_ms, delay)
        }) {
            Ok(worker) => worker,
            Err(_) => {
                diag_error!(TAG, "filter worker spawn failed");
                drop(source);
                cell.clear();
                hub.encoders().release(index);
                return Err(ConfigError::WorkerSpawn);
            }
        };

        source.enable();
        diag_info!(
            TAG,
            "interrupt decoder ready (e1={}, e2={}, guard {} ms)",
            e1_pin,
            config.e2_pin,
            debounce_ms
        );

        Ok(Self {
            hub,
            e1_pin,
            e2_pin: config.e2_pin,
            mode: Mode::Interrupt {
                cell: index,
                source: Some(source),
                worker: Some(worker),
            },
        })
    }

    /// Builds a polling-mode decoder. Both lines become pulled-up inputs.
    ///
    /// Fails with [`ConfigError::PinBusy`] if either line is held by an
    /// interrupt source.
    pub fn polling(hub: &'static IrqHub<H>, config: &EncoderConfig) -> Result<Self, ConfigError> {
        let lines = [config.e1_pin, config.e2_pin];
        if let Some(&busy) = lines.iter().find(|&&pin| hub.pin_claimed(pin)) {
            return Err(ConfigError::PinBusy(busy));
        }
        for pin in lines {
            hub.hal()
                .configure_input(pin, Pull::Up)
                .map_err(|source| ConfigError::InvalidPin { pin, source })?;
        }
        diag_info!(
            TAG,
            "polling decoder ready (e1={}, e2={})",
            config.e1_pin,
            config.e2_pin
        );
        Ok(Self {
            hub,
            e1_pin: config.e1_pin,
            e2_pin: config.e2_pin,
            mode: Mode::Polling {
                state: AtomicU8::new(DecoderState::Idle.as_u8()),
                armed: AtomicBool::new(false),
            },
        })
    }

    /// Returns the last committed state.
    ///
    /// In polling mode this first samples both lines and advances the
    /// detector.
    pub fn state(&self) -> DecoderState {
        match &self.mode {
            Mode::Interrupt { cell, .. } => self.hub.encoders().get(*cell).state(),
            Mode::Polling { state, armed } => {
                let hal = self.hub.hal();
                let (next, commit) = poll_step(
                    armed.load(Ordering::Acquire),
                    hal.is_high(self.e1_pin),
                    hal.is_high(self.e2_pin),
                );
                armed.store(next, Ordering::Release);
                if let Some(committed) = commit {
                    state.store(committed.as_u8(), Ordering::Release);
                }
                DecoderState::from_u8(state.load(Ordering::Acquire))
            }
        }
    }

    /// Sets the state back to `Idle`.
    ///
    /// Leaves the guard window and the polling detector untouched.
    pub fn reset_state(&self) {
        match &self.mode {
            Mode::Interrupt { cell, .. } => {
                self.hub.encoders().get(*cell).commit(DecoderState::Idle)
            }
            Mode::Polling { state, .. } => {
                state.store(DecoderState::Idle.as_u8(), Ordering::Release)
            }
        }
    }

    /// Operating mode.
    pub fn mode(&self) -> EncoderMode {
        match self.mode {
            Mode::Interrupt { .. } => EncoderMode::Interrupt,
            Mode::Polling { .. } => EncoderMode::Polling,
        }
    }

    /// Edge-line interrupt source (interrupt mode only).
    pub fn interrupt_source(&self) -> Option<&InterruptSource<H>> {
        match &self.mode {
            Mode::Interrupt { source, .. } => source.as_ref(),
            Mode::Polling { .. } => None,
        }
    }

    /// Edge-line delivery counters (interrupt mode only).
    pub fn edge_stats(&self) -> Option<IrqStats> {
        self.interrupt_source().map(InterruptSource::stats)
    }

    /// Level and edge line numbers.
    pub fn pins(&self) -> (PinId, PinId) {
        (self.e1_pin, self.e2_pin)
    }
}

#[cfg(feature = "std")]
impl<H: GpioHal> Drop for Decoder<H> {
    fn drop(&mut self) {
        if let Mode::Interrupt {
            cell,
            source,
            worker,
        } = &mut self.mode
        {
            let encoders = self.hub.encoders();
            let state = encoders.get(*cell);
            if let Some(source) = source.as_ref() {
                source.disable();
            }
            state.retire();
            if let Some(worker) = worker.take() {
                if worker.join().is_err() {
                    diag_warn!(TAG, "filter worker panicked");
                }
            }
            drop(source.take());
            state.clear();
            encoders.release(*cell);
        }
    }
}
