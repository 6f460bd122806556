//! Per-unit hardware timers with lazy, init-once construction.
//!
//! A [`TimerBank`] owns the timer HAL and one cell per [`TimerUnit`]. The
//! cell for a unit is built the first time [`TimerBank::timer`] asks for it
//! and then lives as long as the bank. [`Timer`] is a cheap handle to that
//! cell.
//!
//! Units count at 40 ticks per microsecond (80 MHz APB clock, divider 2).
//! On every alarm the counter is reset to zero and the registered
//! [`TimerReaction`] runs in interrupt context.
//!
//! # Example
//!
//! ```rust
//! use irq_io::hal::MockTimer;
//! use irq_io::{TimerBank, TimerUnit};
//!
//! let bank = TimerBank::leak(MockTimer::new());
//! let timer = bank.timer(TimerUnit::Group0Timer1);
//! timer.initialize(1000).unwrap();
//! timer.start();
//!
//! bank.hal().advance(TimerUnit::Group0Timer1, 30_000);
//! assert_eq!(timer.usec_counter(), 750);
//! ```

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::error::ConfigError;
use crate::irq::IrqToken;
use crate::registry::UnitRegistry;
use crate::traits::{TimerHal, TimerUnit};

const TAG: &str = "[Timer]";

/// APB clock feeding the timer groups, in Hz.
pub const TIMER_BASE_CLK: u64 = 80_000_000;

/// Prescaler applied to [`TIMER_BASE_CLK`].
pub const TIMER_DIVIDER: u32 = 2;

/// Counter ticks per microsecond.
pub const TICKS_PER_US: u64 = TIMER_BASE_CLK / TIMER_DIVIDER as u64 / 1_000_000;

/// Converts microseconds to counter ticks.
#[inline]
pub const fn us_to_ticks(us: u64) -> u64 {
    us * TICKS_PER_US
}

/// Converts counter ticks to microseconds, rounding down.
#[inline]
pub const fn ticks_to_us(ticks: u64) -> u64 {
    ticks / TICKS_PER_US
}

/// Function run in interrupt context on every alarm of a unit.
pub struct TimerReaction<T: TimerHal> {
    func: fn(&TimerBank<T>, TimerUnit, IrqToken),
    token: IrqToken,
}

impl<T: TimerHal> TimerReaction<T> {
    /// Pairs a function with the token it will be called with.
    pub const fn new(func: fn(&TimerBank<T>, TimerUnit, IrqToken), token: IrqToken) -> Self {
        Self { func, token }
    }
}

impl<T: TimerHal> Clone for TimerReaction<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: TimerHal> Copy for TimerReaction<T> {}

struct TimerCell<T: TimerHal> {
    intr_flags: i32,
    initialized: AtomicBool,
    alarms: AtomicU32,
    reaction: Mutex<Cell<Option<TimerReaction<T>>>>,
}

impl<T: TimerHal> TimerCell<T> {
    fn new(intr_flags: i32) -> Self {
        Self {
            intr_flags,
            initialized: AtomicBool::new(false),
            alarms: AtomicU32::new(0),
            reaction: Mutex::new(Cell::new(None)),
        }
    }
}

/// Process-wide owner of the hardware timer units.
pub struct TimerBank<T: TimerHal> {
    hal: T,
    units: UnitRegistry<TimerCell<T>, { TimerUnit::COUNT }>,
}

impl<T: TimerHal> TimerBank<T> {
    /// Creates a bank with no unit constructed.
    pub fn new(hal: T) -> Self {
        Self {
            hal,
            units: UnitRegistry::new(),
        }
    }

    /// Creates a bank that lives for the rest of the program.
    pub fn leak(hal: T) -> &'static Self {
        Box::leak(Box::new(Self::new(hal)))
    }

    /// Returns the timer HAL.
    #[inline]
    pub fn hal(&self) -> &T {
        &self.hal
    }

    /// Returns the handle for `unit`, constructing its cell on first use.
    pub fn timer(&'static self, unit: TimerUnit) -> Timer<T> {
        self.timer_with_flags(unit, 0)
    }

    /// Like [`timer`](Self::timer), with interrupt allocation flags.
    ///
    /// `intr_flags` only applies when this call constructs the unit.
    pub fn timer_with_flags(&'static self, unit: TimerUnit, intr_flags: i32) -> Timer<T> {
        let cell = self
            .units
            .get_or_init(unit.index(), || TimerCell::new(intr_flags));
        Timer {
            bank: self,
            unit,
            cell,
        }
    }

    /// Number of units constructed so far.
    pub fn constructed_count(&self) -> usize {
        self.units.initialized_count()
    }

    /// Entry point for the HAL's alarm handler. Interrupt context.
    pub fn handle_alarm(&self, unit: TimerUnit) {
        let Some(cell) = self.units.get(unit.index()) else {
            return;
        };
        self.hal.set_counter(unit, 0);
        cell.alarms.fetch_add(1, Ordering::Relaxed);
        if let Some(reaction) = critical_section::with(|cs| cell.reaction.borrow(cs).get()) {
            (reaction.func)(self, unit, reaction.token);
        }
    }
}

/// Handle to one constructed timer unit.
pub struct Timer<T: TimerHal> {
    bank: &'static TimerBank<T>,
    unit: TimerUnit,
    cell: Option<&'static TimerCell<T>>,
}

impl<T: TimerHal> Clone for Timer<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: TimerHal> Copy for Timer<T> {}

impl<T: TimerHal> Timer<T> {
    /// Unit this handle refers to.
    #[inline]
    pub fn unit(&self) -> TimerUnit {
        self.unit
    }

    /// Initializes the unit with an alarm every `period_us` microseconds.
    pub fn initialize(&self, period_us: u32) -> Result<(), ConfigError> {
        self.initialize_ticks(us_to_ticks(u64::from(period_us)))
    }

    /// Initializes the unit with an alarm every `period_ticks` ticks.
    ///
    /// The unit is left paused with its counter at zero, counting up with
    /// auto-reload, and its alarm handler installed. Does nothing if the unit
    /// is already initialized; use [`change_period_ticks`](Self::change_period_ticks)
    /// to move the alarm of a running unit.
    pub fn initialize_ticks(&self, period_ticks: u64) -> Result<(), ConfigError> {
        if self.is_initialized() {
            return Ok(());
        }
        let hal = &self.bank.hal;
        hal.init(self.unit, TIMER_DIVIDER, period_ticks)
            .map_err(ConfigError::Hal)?;
        hal.set_counter(self.unit, 0);
        let intr_flags = self.cell().map_or(0, |cell| cell.intr_flags);
        if let Err(e) = hal.install_isr(self.unit, self.bank, intr_flags) {
            diag_error!(TAG, "alarm handler install failed: {}", e.code());
            hal.deinit(self.unit);
            return Err(ConfigError::Hal(e));
        }
        if let Some(cell) = self.cell() {
            cell.initialized.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Stops the unit, removes its alarm handler and releases it.
    pub fn deinitialize(&self) {
        let Some(cell) = self.cell() else {
            return;
        };
        if cell.initialized.swap(false, Ordering::AcqRel) {
            let hal = &self.bank.hal;
            hal.pause(self.unit);
            hal.remove_isr(self.unit);
            hal.deinit(self.unit);
        }
    }

    /// Returns true between `initialize` and `deinitialize`.
    pub fn is_initialized(&self) -> bool {
        self.cell()
            .is_some_and(|cell| cell.initialized.load(Ordering::Acquire))
    }

    /// Starts counting.
    pub fn start(&self) {
        self.bank.hal.start(self.unit);
    }

    /// Pauses counting.
    pub fn stop(&self) {
        self.bank.hal.pause(self.unit);
    }

    /// Sets the counter to zero.
    pub fn reset(&self) {
        self.set_counter(0);
    }

    /// Counter value in ticks.
    pub fn counter(&self) -> u64 {
        self.bank.hal.counter(self.unit)
    }

    /// Counter value in microseconds.
    pub fn usec_counter(&self) -> u64 {
        ticks_to_us(self.counter())
    }

    /// Overwrites the counter in ticks.
    pub fn set_counter(&self, ticks: u64) {
        self.bank.hal.set_counter(self.unit, ticks);
    }

    /// Overwrites the counter in microseconds.
    pub fn set_usec_counter(&self, us: u32) {
        self.set_counter(us_to_ticks(u64::from(us)));
    }

    /// Moves the alarm to `period_us` microseconds.
    pub fn change_period(&self, period_us: u32) {
        self.change_period_ticks(us_to_ticks(u64::from(period_us)));
    }

    /// Moves the alarm to `period_ticks` ticks.
    pub fn change_period_ticks(&self, period_ticks: u64) {
        self.bank.hal.set_alarm(self.unit, period_ticks);
    }

    /// Registers `reaction`, replacing any previous one.
    pub fn set_reaction(&self, reaction: TimerReaction<T>) {
        if let Some(cell) = self.cell() {
            critical_section::with(|cs| cell.reaction.borrow(cs).set(Some(reaction)));
        }
    }

    /// Removes the registered reaction.
    pub fn clear_reaction(&self) {
        if let Some(cell) = self.cell() {
            critical_section::with(|cs| cell.reaction.borrow(cs).set(None));
        }
    }

    /// Alarms handled since the unit was constructed.
    pub fn alarm_count(&self) -> u32 {
        self.cell()
            .map_or(0, |cell| cell.alarms.load(Ordering::Relaxed))
    }

    fn cell(&self) -> Option<&'static TimerCell<T>> {
        self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockTimer;
    use crate::traits::HalError;

    fn mark_alarm(bank: &TimerBank<MockTimer>, _unit: TimerUnit, token: IrqToken) {
        bank.hal().record_mark(token.index());
    }

    #[test]
    fn tick_conversions() {
        assert_eq!(TICKS_PER_US, 40);
        assert_eq!(us_to_ticks(1000), 40_000);
        assert_eq!(ticks_to_us(40_039), 1000);
    }

    #[test]
    fn units_are_constructed_once() {
        let bank = TimerBank::leak(MockTimer::new());
        assert_eq!(bank.constructed_count(), 0);
        let a = bank.timer_with_flags(TimerUnit::Group1Timer0, 7);
        let b = bank.timer_with_flags(TimerUnit::Group1Timer0, 9);
        assert_eq!(bank.constructed_count(), 1);

        a.initialize(10).unwrap();
        assert_eq!(bank.hal().intr_flags(TimerUnit::Group1Timer0), Some(7));
        assert!(b.is_initialized());
    }

    #[test]
    fn initialize_programs_divider_and_alarm() {
        let bank = TimerBank::leak(MockTimer::new());
        let timer = bank.timer(TimerUnit::Group0Timer0);
        timer.initialize(250).unwrap();

        let hal = bank.hal();
        assert_eq!(hal.divider(TimerUnit::Group0Timer0), Some(TIMER_DIVIDER));
        assert_eq!(hal.alarm(TimerUnit::Group0Timer0), 10_000);
        assert!(!hal.is_running(TimerUnit::Group0Timer0));
        assert_eq!(timer.counter(), 0);
    }

    #[test]
    fn initialize_reports_hal_failure() {
        let bank = TimerBank::leak(MockTimer::new());
        bank.hal().fail_next_init(HalError::new(0x103));
        let timer = bank.timer(TimerUnit::Group0Timer0);
        assert_eq!(timer.initialize(10), Err(ConfigError::Hal(HalError::new(0x103))));
        assert!(!timer.is_initialized());
    }

    #[test]
    fn alarm_resets_counter_and_runs_reaction() {
        let bank = TimerBank::leak(MockTimer::new());
        let timer = bank.timer(TimerUnit::Group0Timer1);
        timer.initialize_ticks(100).unwrap();
        timer.set_reaction(TimerReaction::new(mark_alarm, IrqToken::new(3)));
        timer.start();

        bank.hal().advance(TimerUnit::Group0Timer1, 250);
        assert_eq!(timer.alarm_count(), 2);
        assert_eq!(bank.hal().marks(), vec![3, 3]);
        assert_eq!(timer.counter(), 0);

        timer.clear_reaction();
        bank.hal().advance(TimerUnit::Group0Timer1, 100);
        assert_eq!(timer.alarm_count(), 3);
        assert_eq!(bank.hal().marks().len(), 2);
    }

    #[test]
    fn stopped_timer_does_not_count() {
        let bank = TimerBank::leak(MockTimer::new());
        let timer = bank.timer(TimerUnit::Group1Timer1);
        timer.initialize(100).unwrap();
        bank.hal().advance(TimerUnit::Group1Timer1, 500);
        assert_eq!(timer.counter(), 0);

        timer.start();
        bank.hal().advance(TimerUnit::Group1Timer1, 400);
        timer.stop();
        bank.hal().advance(TimerUnit::Group1Timer1, 400);
        assert_eq!(timer.usec_counter(), 10);
    }

    #[test]
    fn counter_setters_and_period_change() {
        let bank = TimerBank::leak(MockTimer::new());
        let timer = bank.timer(TimerUnit::Group0Timer0);
        timer.initialize(100).unwrap();

        timer.set_usec_counter(25);
        assert_eq!(timer.counter(), 1000);
        timer.reset();
        assert_eq!(timer.counter(), 0);

        timer.change_period(50);
        assert_eq!(bank.hal().alarm(TimerUnit::Group0Timer0), 2000);
        timer.change_period_ticks(77);
        assert_eq!(bank.hal().alarm(TimerUnit::Group0Timer0), 77);
    }

    #[test]
    fn initialize_twice_keeps_running_unit() {
        let bank = TimerBank::leak(MockTimer::new());
        let timer = bank.timer(TimerUnit::Group1Timer0);
        timer.initialize(100).unwrap();
        timer.start();
        bank.hal().advance(TimerUnit::Group1Timer0, 120);

        timer.initialize(200).unwrap();
        let hal = bank.hal();
        assert_eq!(hal.alarm(TimerUnit::Group1Timer0), 4000);
        assert!(hal.is_running(TimerUnit::Group1Timer0));
        assert_eq!(timer.counter(), 120);
        assert!(hal.isr_installed(TimerUnit::Group1Timer0));
    }

    #[test]
    fn deinitialize_removes_handler() {
        let bank = TimerBank::leak(MockTimer::new());
        let timer = bank.timer(TimerUnit::Group0Timer0);
        timer.initialize(100).unwrap();
        timer.start();
        timer.deinitialize();

        let hal = bank.hal();
        assert!(!hal.is_running(TimerUnit::Group0Timer0));
        assert!(!hal.isr_installed(TimerUnit::Group0Timer0));
        assert!(hal.divider(TimerUnit::Group0Timer0).is_none());
        assert!(!timer.is_initialized());

        // Second call is a no-op
        timer.deinitialize();
    }
}
