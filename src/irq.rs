//! Interrupt hub, interrupt sources and reactions.
//!
//! An [`IrqHub`] owns the GPIO HAL and a fixed arena of interrupt source
//! slots. The HAL forwards every edge to [`IrqHub::handle_edge`], which finds
//! the slot claimed for that pin and fires it.
//!
//! Reactions are plain function pointers paired with an [`IrqToken`]. The
//! token is the only per-instance state the interrupt path carries; the
//! reaction resolves it back to its owner through the hub (for example
//! [`IrqHub::encoders`]). Nothing is boxed and nothing is captured.
//!
//! # Interrupt context rules
//!
//! A reaction runs in interrupt context. It may read pins, touch atomics,
//! enable or disable sources and give an [`IsrSignal`](crate::IsrSignal).
//! It must not block, allocate or log.
//!
//! # Example
//!
//! ```rust
//! use core::sync::atomic::{AtomicU32, Ordering};
//! use irq_io::hal::MockGpio;
//! use irq_io::{Edge, InterruptConfig, InterruptSource, IrqHub, IrqToken, Reaction};
//!
//! static FIRED: AtomicU32 = AtomicU32::new(0);
//!
//! fn count(_hub: &IrqHub<MockGpio>, _token: IrqToken) {
//!     FIRED.fetch_add(1, Ordering::Relaxed);
//! }
//!
//! let hub = IrqHub::leak(MockGpio::new());
//! let config = InterruptConfig::new(12).with_edge(Edge::Rising);
//! let source = InterruptSource::configure(hub, &config).unwrap();
//! source.set_reaction(Reaction::new(count, IrqToken::new(0)));
//!
//! // Sources start disabled
//! assert!(!hub.hal().trigger_edge(12));
//!
//! source.enable();
//! assert!(hub.hal().trigger_edge(12));
//! assert_eq!(FIRED.load(Ordering::Relaxed), 1);
//! ```

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::config::InterruptConfig;
use crate::error::ConfigError;
use crate::registry::SlotPool;
use crate::traits::{GpioHal, PinId};

#[cfg(feature = "std")]
use crate::encoder::EncoderCell;

/// Maximum number of interrupt sources a hub can hold.
pub const MAX_IRQ_SOURCES: usize = 16;

/// Maximum number of interrupt-mode decoders a hub can hold.
#[cfg(feature = "std")]
pub const MAX_ENCODERS: usize = 8;

/// Pin value of a slot that is not bound to any line.
const UNASSIGNED: PinId = PinId::MAX;

// ============================================================================
// Tokens and Reactions
// ============================================================================

/// Opaque per-instance index handed to a reaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IrqToken(usize);

impl IrqToken {
    /// Wraps a raw index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Function run in interrupt context when a source fires.
///
/// The function receives the hub and the token it was registered with.
pub struct Reaction<H: GpioHal> {
    func: fn(&IrqHub<H>, IrqToken),
    token: IrqToken,
}

impl<H: GpioHal> Reaction<H> {
    /// Pairs a function with the token it will be called with.
    pub const fn new(func: fn(&IrqHub<H>, IrqToken), token: IrqToken) -> Self {
        Self { func, token }
    }

    /// Token passed to the function.
    #[inline]
    pub const fn token(&self) -> IrqToken {
        self.token
    }

    #[inline]
    fn invoke(self, hub: &IrqHub<H>) {
        (self.func)(hub, self.token)
    }
}

// Derives would require `H: Clone`; a fn pointer and a token are always Copy.
impl<H: GpioHal> Clone for Reaction<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H: GpioHal> Copy for Reaction<H> {}

impl<H: GpioHal> core::fmt::Debug for Reaction<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reaction").field("token", &self.token).finish()
    }
}

// ============================================================================
// Slots
// ============================================================================

/// Per-source delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqStats {
    /// Edges that ran the registered reaction.
    pub delivered: u32,
    /// Edges dropped because the source was disabled.
    pub masked: u32,
    /// Edges that arrived while enabled but with no reaction registered.
    pub unhandled: u32,
}

struct SourceSlot<H: GpioHal> {
    pin: AtomicU32,
    enabled: AtomicBool,
    reaction: Mutex<Cell<Option<Reaction<H>>>>,
    delivered: AtomicU32,
    masked: AtomicU32,
    unhandled: AtomicU32,
}

impl<H: GpioHal> Default for SourceSlot<H> {
    fn default() -> Self {
        Self {
            pin: AtomicU32::new(UNASSIGNED),
            enabled: AtomicBool::new(false),
            reaction: Mutex::new(Cell::new(None)),
            delivered: AtomicU32::new(0),
            masked: AtomicU32::new(0),
            unhandled: AtomicU32::new(0),
        }
    }
}

impl<H: GpioHal> SourceSlot<H> {
    fn clear(&self) {
        self.enabled.store(false, Ordering::Release);
        critical_section::with(|cs| self.reaction.borrow(cs).set(None));
        self.delivered.store(0, Ordering::Relaxed);
        self.masked.store(0, Ordering::Relaxed);
        self.unhandled.store(0, Ordering::Relaxed);
        self.pin.store(UNASSIGNED, Ordering::Release);
    }

    fn pin(&self) -> PinId {
        self.pin.load(Ordering::Acquire)
    }

    fn stats(&self) -> IrqStats {
        IrqStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            masked: self.masked.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Hub
// ============================================================================

/// Process-wide interrupt context.
///
/// Holds the GPIO HAL, the interrupt source arena and (with `std`) the
/// decoder cell arena. The HAL's interrupt handlers need a `&'static`
/// reference to the hub, so it is normally created once with
/// [`leak`](Self::leak) or placed in a `static`.
pub struct IrqHub<H: GpioHal> {
    hal: H,
    sources: SlotPool<SourceSlot<H>, MAX_IRQ_SOURCES>,
    #[cfg(feature = "std")]
    encoders: SlotPool<EncoderCell, MAX_ENCODERS>,
}

impl<H: GpioHal> IrqHub<H> {
    /// Creates a hub with every slot free.
    pub fn new(hal: H) -> Self {
        Self {
            hal,
            sources: SlotPool::new(),
            #[cfg(feature = "std")]
            encoders: SlotPool::new(),
        }
    }

    /// Creates a hub that lives for the rest of the program.
    #[cfg(feature = "std")]
    pub fn leak(hal: H) -> &'static Self {
        Box::leak(Box::new(Self::new(hal)))
    }

    /// Returns the GPIO HAL.
    #[inline]
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Decoder cells resolved by decoder reactions.
    #[cfg(feature = "std")]
    #[inline]
    pub fn encoders(&self) -> &SlotPool<EncoderCell, MAX_ENCODERS> {
        &self.encoders
    }

    /// Entry point for the HAL's edge handler. Interrupt context.
    pub fn handle_edge(&self, pin: PinId) {
        for (index, slot) in self.sources.iter_claimed() {
            if slot.pin() == pin {
                self.fire(IrqToken(index));
            }
        }
    }

    /// Fires the source identified by `token`. Interrupt context.
    ///
    /// Disabled sources drop the edge; enabled sources without a reaction
    /// count it as unhandled.
    pub fn fire(&self, token: IrqToken) {
        let Some(slot) = self.slot(token) else {
            return;
        };
        if !slot.enabled.load(Ordering::Acquire) {
            slot.masked.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match critical_section::with(|cs| slot.reaction.borrow(cs).get()) {
            Some(reaction) => {
                slot.delivered.fetch_add(1, Ordering::Relaxed);
                reaction.invoke(self);
            }
            None => {
                slot.unhandled.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Unmasks the source. Idempotent; safe from a reaction.
    pub fn enable_source(&self, token: IrqToken) {
        if let Some(slot) = self.slot(token) {
            slot.enabled.store(true, Ordering::Release);
            self.hal.enable_interrupt(slot.pin());
        }
    }

    /// Masks the source. Idempotent; safe from a reaction.
    ///
    /// A reaction already running is not interrupted.
    pub fn disable_source(&self, token: IrqToken) {
        if let Some(slot) = self.slot(token) {
            slot.enabled.store(false, Ordering::Release);
            self.hal.disable_interrupt(slot.pin());
        }
    }

    /// Returns true if the source is claimed and enabled.
    pub fn is_enabled(&self, token: IrqToken) -> bool {
        self.slot(token)
            .is_some_and(|slot| slot.enabled.load(Ordering::Acquire))
    }

    /// Delivery counters of the source, if it is claimed.
    pub fn source_stats(&self, token: IrqToken) -> Option<IrqStats> {
        self.slot(token).map(SourceSlot::stats)
    }

    /// Number of claimed interrupt sources.
    pub fn source_count(&self) -> usize {
        self.sources.claimed_count()
    }

    fn slot(&self, token: IrqToken) -> Option<&SourceSlot<H>> {
        self.sources.claimed(token.0)
    }

    /// Returns true if an interrupt source holds `pin`.
    pub(crate) fn pin_claimed(&self, pin: PinId) -> bool {
        self.sources.iter_claimed().any(|(_, slot)| slot.pin() == pin)
    }

    /// Binds a freshly claimed slot to `pin`.
    ///
    /// The pin is published before the other slots are scanned, so of two
    /// racing claims at least one sees the other and backs out.
    fn bind_pin(&self, index: usize, pin: PinId) -> bool {
        self.sources.get(index).pin.store(pin, Ordering::SeqCst);
        !self
            .sources
            .iter_claimed()
            .any(|(other, slot)| other != index && slot.pin.load(Ordering::SeqCst) == pin)
    }

    fn set_reaction(&self, token: IrqToken, reaction: Option<Reaction<H>>) {
        if let Some(slot) = self.slot(token) {
            critical_section::with(|cs| slot.reaction.borrow(cs).set(reaction));
        }
    }

    fn has_reaction(&self, token: IrqToken) -> bool {
        self.slot(token).is_some_and(|slot| {
            critical_section::with(|cs| slot.reaction.borrow(cs).get().is_some())
        })
    }

    fn release(&self, token: IrqToken) {
        if let Some(slot) = self.slot(token) {
            slot.clear();
            self.sources.release(token.0);
        }
    }
}

// ============================================================================
// Interrupt Source
// ============================================================================

/// One GPIO line claimed for interrupt use.
///
/// Starts disabled. Dropping the source disables it, removes the handler,
/// resets the pin and frees its slot.
pub struct InterruptSource<H: GpioHal> {
    hub: &'static IrqHub<H>,
    token: IrqToken,
    pin: PinId,
}

impl<H: GpioHal> InterruptSource<H> {
    /// Claims `config.pin` for interrupt use.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::PinBusy`] if another source holds the pin
    /// - [`ConfigError::NoFreeSlot`] if the hub's arena is full
    /// - [`ConfigError::InvalidPin`] if the pin cannot be configured
    /// - [`ConfigError::IsrInstall`] if the edge handler cannot be installed
    pub fn configure(
        hub: &'static IrqHub<H>,
        config: &InterruptConfig,
    ) -> Result<Self, ConfigError> {
        let pin = config.pin;
        if hub.pin_claimed(pin) {
            return Err(ConfigError::PinBusy(pin));
        }

        let index = hub.sources.claim().ok_or(ConfigError::NoFreeSlot)?;
        let token = IrqToken(index);
        if !hub.bind_pin(index, pin) {
            hub.release(token);
            return Err(ConfigError::PinBusy(pin));
        }

        if let Err(source) = hub.hal.configure_interrupt(pin, config.pull(), config.edge) {
            hub.release(token);
            return Err(ConfigError::InvalidPin { pin, source });
        }

        if let Err(source) = hub.hal.install_isr(pin, hub) {
            hub.hal.reset_pin(pin);
            hub.release(token);
            return Err(ConfigError::IsrInstall { pin, source });
        }

        Ok(Self { hub, token, pin })
    }

    /// Slot token of this source.
    #[inline]
    pub fn token(&self) -> IrqToken {
        self.token
    }

    /// GPIO number of this source.
    #[inline]
    pub fn pin(&self) -> PinId {
        self.pin
    }

    /// Hub this source belongs to.
    #[inline]
    pub fn hub(&self) -> &'static IrqHub<H> {
        self.hub
    }

    /// Registers `reaction`, replacing any previous one.
    ///
    /// Takes effect for the next edge.
    pub fn set_reaction(&self, reaction: Reaction<H>) {
        self.hub.set_reaction(self.token, Some(reaction));
    }

    /// Removes the registered reaction.
    pub fn clear_reaction(&self) {
        self.hub.set_reaction(self.token, None);
    }

    /// Returns true if a reaction is registered.
    pub fn has_reaction(&self) -> bool {
        self.hub.has_reaction(self.token)
    }

    /// Unmasks the line.
    pub fn enable(&self) {
        self.hub.enable_source(self.token);
    }

    /// Masks the line.
    pub fn disable(&self) {
        self.hub.disable_source(self.token);
    }

    /// Returns true if the line is unmasked.
    pub fn is_enabled(&self) -> bool {
        self.hub.is_enabled(self.token)
    }

    /// Delivery counters.
    pub fn stats(&self) -> IrqStats {
        self.hub.source_stats(self.token).unwrap_or_default()
    }
}

impl<H: GpioHal> Drop for InterruptSource<H> {
    fn drop(&mut self) {
        self.disable();
        self.clear_reaction();
        self.hub.hal.remove_isr(self.pin);
        self.hub.hal.reset_pin(self.pin);
        self.hub.release(self.token);
    }
}

impl<H: GpioHal> core::fmt::Debug for InterruptSource<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterruptSource")
            .field("pin", &self.pin)
            .field("token", &self.token)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockGpio;
    use crate::traits::{Edge, Pull};

    fn count_into_token_pin(hub: &IrqHub<MockGpio>, token: IrqToken) {
        // Records the firing by raising the pin named by the token.
        hub.hal().set_level(token.index() as PinId, true);
    }

    fn disable_self(hub: &IrqHub<MockGpio>, token: IrqToken) {
        hub.disable_source(token);
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    #[test]
    fn configure_starts_disabled() {
        let hub = IrqHub::leak(MockGpio::new());
        let config = InterruptConfig::new(5).with_pull(true, false).with_edge(Edge::Falling);
        let source = InterruptSource::configure(hub, &config).unwrap();

        assert!(!source.is_enabled());
        assert!(!hub.hal().interrupt_enabled(5));
        assert_eq!(hub.hal().pull_of(5), Some(Pull::Up));
        assert_eq!(hub.hal().edge_of(5), Some(Edge::Falling));
        assert!(hub.hal().isr_installed(5));
    }

    #[test]
    fn configure_rejects_claimed_pin() {
        let hub = IrqHub::leak(MockGpio::new());
        let _first = InterruptSource::configure(hub, &InterruptConfig::new(5)).unwrap();
        let second = InterruptSource::configure(hub, &InterruptConfig::new(5));
        assert_eq!(second.unwrap_err(), ConfigError::PinBusy(5));
    }

    #[test]
    fn racing_claims_never_share_a_pin() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        for _ in 0..50 {
            let hub = IrqHub::leak(MockGpio::new());
            let barrier = Arc::new(Barrier::new(4));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        InterruptSource::configure(hub, &InterruptConfig::new(9)).ok()
                    })
                })
                .collect();
            let winners: Vec<_> = handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .collect();
            assert!(winners.len() <= 1);
            assert_eq!(hub.source_count(), winners.len());
        }
    }

    #[test]
    fn configure_rejects_invalid_pin_and_frees_slot() {
        let hub = IrqHub::leak(MockGpio::new());
        let result = InterruptSource::configure(hub, &InterruptConfig::new(99));
        assert!(matches!(result, Err(ConfigError::InvalidPin { pin: 99, .. })));
        assert_eq!(hub.source_count(), 0);
    }

    #[test]
    fn configure_reports_isr_install_failure() {
        let hub = IrqHub::leak(MockGpio::new());
        hub.hal().fail_next_isr_install();
        let result = InterruptSource::configure(hub, &InterruptConfig::new(3));
        assert!(matches!(result, Err(ConfigError::IsrInstall { pin: 3, .. })));
        assert_eq!(hub.source_count(), 0);
        assert_eq!(hub.hal().reset_count(3), 1);
    }

    #[test]
    fn configure_fails_when_arena_full() {
        let hub = IrqHub::leak(MockGpio::new());
        let sources: Vec<_> = (0..MAX_IRQ_SOURCES as PinId)
            .map(|pin| InterruptSource::configure(hub, &InterruptConfig::new(pin)).unwrap())
            .collect();
        let overflow = InterruptSource::configure(hub, &InterruptConfig::new(30));
        assert_eq!(overflow.unwrap_err(), ConfigError::NoFreeSlot);
        drop(sources);
        assert!(InterruptSource::configure(hub, &InterruptConfig::new(30)).is_ok());
    }

    // =========================================================================
    // Firing
    // =========================================================================

    #[test]
    fn enabled_source_runs_reaction() {
        let hub = IrqHub::leak(MockGpio::new());
        let source = InterruptSource::configure(hub, &InterruptConfig::new(5)).unwrap();
        source.set_reaction(Reaction::new(count_into_token_pin, IrqToken::new(20)));
        source.enable();

        assert!(hub.hal().trigger_edge(5));
        assert!(hub.hal().is_high(20));
        assert_eq!(source.stats().delivered, 1);
    }

    #[test]
    fn disabled_source_drops_edges() {
        let hub = IrqHub::leak(MockGpio::new());
        let source = InterruptSource::configure(hub, &InterruptConfig::new(5)).unwrap();
        source.set_reaction(Reaction::new(count_into_token_pin, IrqToken::new(20)));

        hub.fire(source.token());
        assert!(!hub.hal().is_high(20));
        assert_eq!(source.stats().masked, 1);
    }

    #[test]
    fn fire_without_reaction_is_counted() {
        let hub = IrqHub::leak(MockGpio::new());
        let source = InterruptSource::configure(hub, &InterruptConfig::new(5)).unwrap();
        source.enable();
        assert!(hub.hal().trigger_edge(5));
        assert_eq!(
            source.stats(),
            IrqStats {
                delivered: 0,
                masked: 0,
                unhandled: 1
            }
        );
    }

    #[test]
    fn reaction_can_disable_its_own_source() {
        let hub = IrqHub::leak(MockGpio::new());
        let source = InterruptSource::configure(hub, &InterruptConfig::new(5)).unwrap();
        source.set_reaction(Reaction::new(disable_self, source.token()));
        source.enable();

        assert!(hub.hal().trigger_edge(5));
        assert!(!source.is_enabled());
        assert!(!hub.hal().trigger_edge(5));
        assert_eq!(source.stats().delivered, 1);
    }

    #[test]
    fn enable_disable_are_idempotent() {
        let hub = IrqHub::leak(MockGpio::new());
        let source = InterruptSource::configure(hub, &InterruptConfig::new(5)).unwrap();
        source.enable();
        source.enable();
        assert!(source.is_enabled());
        source.disable();
        source.disable();
        assert!(!source.is_enabled());
        assert!(!hub.hal().interrupt_enabled(5));
    }

    #[test]
    fn set_reaction_replaces_previous() {
        let hub = IrqHub::leak(MockGpio::new());
        let source = InterruptSource::configure(hub, &InterruptConfig::new(5)).unwrap();
        source.set_reaction(Reaction::new(count_into_token_pin, IrqToken::new(20)));
        source.set_reaction(Reaction::new(count_into_token_pin, IrqToken::new(21)));
        source.enable();
        hub.hal().trigger_edge(5);
        assert!(!hub.hal().is_high(20));
        assert!(hub.hal().is_high(21));

        source.clear_reaction();
        assert!(!source.has_reaction());
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    #[test]
    fn drop_releases_pin_and_handler() {
        let hub = IrqHub::leak(MockGpio::new());
        let source = InterruptSource::configure(hub, &InterruptConfig::new(5)).unwrap();
        let token = source.token();
        source.enable();
        drop(source);

        assert!(!hub.hal().isr_installed(5));
        assert!(!hub.hal().interrupt_enabled(5));
        assert_eq!(hub.hal().reset_count(5), 1);
        assert!(hub.source_stats(token).is_none());
        assert!(InterruptSource::configure(hub, &InterruptConfig::new(5)).is_ok());
    }

    #[test]
    fn handle_edge_ignores_unclaimed_pins() {
        let hub = IrqHub::leak(MockGpio::new());
        hub.handle_edge(7);
        hub.fire(IrqToken::new(3));
        assert_eq!(hub.source_count(), 0);
    }
}
