//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for every hardware trait, so the
//! interrupt core, decoder, channel and timers run on a desktop.
//!
//! Test code plays the role of the interrupt controller: calling
//! [`MockGpio::trigger_edge`], [`MockEventQueue::post`] or
//! [`MockTimer::advance`] runs the same handler path real hardware would.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockGpio`] | [`GpioHal`] | Pin levels, pull/edge config, edge injection |
//! | [`MockDelay`] | [`BlockingDelay`] | Immediate or test-released delays |
//! | [`MockUart`] | [`UartDriver`] | RX bytes, TX capture, partial writes |
//! | [`MockEventQueue`] | [`EventQueue`] | Bounded queue with ISR-style `post` |
//! | [`MockTimer`] | [`TimerHal`] | Manually advanced counters and alarms |
//!
//! # Example
//!
//! ```rust
//! use irq_io::hal::MockGpio;
//! use irq_io::traits::{Edge, GpioHal, Pull};
//!
//! let gpio = MockGpio::new();
//! gpio.configure_interrupt(5, Pull::Up, Edge::Falling).unwrap();
//!
//! // Pull-up without an explicit level reads high
//! assert!(gpio.is_high(5));
//! assert!(!gpio.interrupt_enabled(5));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::config::UartConfig;
use crate::error::DriverError;
use crate::irq::IrqHub;
use crate::timer::TimerBank;
use crate::traits::{
    BlockingDelay, Edge, Event, EventQueue, GpioHal, HalError, PinId, Pull, TimerHal, TimerUnit,
    UartDriver,
};

/// `ESP_ERR_INVALID_ARG`
const ERR_INVALID_ARG: i32 = 0x102;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// GPIO
// ============================================================================

#[derive(Default)]
struct PinState {
    level: Option<bool>,
    pull: Option<Pull>,
    edge: Option<Edge>,
    interrupt_enabled: bool,
    router: Option<&'static IrqHub<MockGpio>>,
    resets: usize,
}

#[derive(Default)]
struct GpioState {
    pins: HashMap<PinId, PinState>,
    fail_next_isr_install: bool,
}

/// Mock GPIO bank.
///
/// Pins `0..PIN_COUNT` exist; anything above fails configuration. A pin
/// without an explicit level reads the level its pull resistor gives.
///
/// # Example
///
/// ```rust
/// use irq_io::hal::MockGpio;
/// use irq_io::traits::{GpioHal, Pull};
///
/// let gpio = MockGpio::new();
/// assert!(gpio.configure_input(99, Pull::Up).is_err());
///
/// gpio.configure_input(4, Pull::Down).unwrap();
/// assert!(!gpio.is_high(4));
/// gpio.set_level(4, true);
/// assert!(gpio.is_high(4));
/// ```
#[derive(Default)]
pub struct MockGpio {
    state: Mutex<GpioState>,
}

impl MockGpio {
    /// Number of pins the mock accepts.
    pub const PIN_COUNT: PinId = 40;

    /// Creates a bank with every pin unconfigured and low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives `pin` to `high`.
    pub fn set_level(&self, pin: PinId, high: bool) {
        lock(&self.state).pins.entry(pin).or_default().level = Some(high);
    }

    /// Simulates an edge on `pin`.
    ///
    /// Returns true if the edge reached the interrupt hub, which requires an
    /// installed handler and an unmasked pin interrupt.
    pub fn trigger_edge(&self, pin: PinId) -> bool {
        // Copy the router out so the handler runs without the lock held.
        let router = {
            let state = lock(&self.state);
            state
                .pins
                .get(&pin)
                .filter(|p| p.interrupt_enabled)
                .and_then(|p| p.router)
        };
        match router {
            Some(hub) => {
                hub.handle_edge(pin);
                true
            }
            None => false,
        }
    }

    /// Makes the next `install_isr` call fail.
    pub fn fail_next_isr_install(&self) {
        lock(&self.state).fail_next_isr_install = true;
    }

    /// Returns true if the interrupt of `pin` is unmasked.
    pub fn interrupt_enabled(&self, pin: PinId) -> bool {
        self.with_pin(pin, |p| p.interrupt_enabled).unwrap_or(false)
    }

    /// Returns true if an edge handler is installed on `pin`.
    pub fn isr_installed(&self, pin: PinId) -> bool {
        self.with_pin(pin, |p| p.router.is_some()).unwrap_or(false)
    }

    /// Pull configured on `pin`.
    pub fn pull_of(&self, pin: PinId) -> Option<Pull> {
        self.with_pin(pin, |p| p.pull).flatten()
    }

    /// Interrupt trigger configured on `pin`.
    pub fn edge_of(&self, pin: PinId) -> Option<Edge> {
        self.with_pin(pin, |p| p.edge).flatten()
    }

    /// Number of `reset_pin` calls for `pin`.
    pub fn reset_count(&self, pin: PinId) -> usize {
        self.with_pin(pin, |p| p.resets).unwrap_or(0)
    }

    fn with_pin<R>(&self, pin: PinId, f: impl FnOnce(&PinState) -> R) -> Option<R> {
        lock(&self.state).pins.get(&pin).map(f)
    }

    fn check_pin(pin: PinId) -> Result<(), HalError> {
        if pin < Self::PIN_COUNT {
            Ok(())
        } else {
            Err(HalError::new(ERR_INVALID_ARG))
        }
    }
}

impl GpioHal for MockGpio {
    fn configure_input(&self, pin: PinId, pull: Pull) -> Result<(), HalError> {
        Self::check_pin(pin)?;
        let mut state = lock(&self.state);
        let entry = state.pins.entry(pin).or_default();
        entry.pull = Some(pull);
        entry.edge = None;
        entry.interrupt_enabled = false;
        Ok(())
    }

    fn configure_interrupt(&self, pin: PinId, pull: Pull, edge: Edge) -> Result<(), HalError> {
        Self::check_pin(pin)?;
        let mut state = lock(&self.state);
        let entry = state.pins.entry(pin).or_default();
        entry.pull = Some(pull);
        entry.edge = Some(edge);
        entry.interrupt_enabled = false;
        Ok(())
    }

    fn is_high(&self, pin: PinId) -> bool {
        self.with_pin(pin, |p| {
            p.level
                .unwrap_or_else(|| p.pull.is_some_and(|pull| pull.pull_up()))
        })
        .unwrap_or(false)
    }

    fn install_isr(&self, pin: PinId, router: &'static IrqHub<Self>) -> Result<(), HalError> {
        Self::check_pin(pin)?;
        let mut state = lock(&self.state);
        if std::mem::take(&mut state.fail_next_isr_install) {
            return Err(HalError::FAIL);
        }
        state.pins.entry(pin).or_default().router = Some(router);
        Ok(())
    }

    fn remove_isr(&self, pin: PinId) {
        if let Some(p) = lock(&self.state).pins.get_mut(&pin) {
            p.router = None;
        }
    }

    fn enable_interrupt(&self, pin: PinId) {
        lock(&self.state).pins.entry(pin).or_default().interrupt_enabled = true;
    }

    fn disable_interrupt(&self, pin: PinId) {
        lock(&self.state).pins.entry(pin).or_default().interrupt_enabled = false;
    }

    fn reset_pin(&self, pin: PinId) {
        let mut state = lock(&self.state);
        let entry = state.pins.entry(pin).or_default();
        let resets = entry.resets + 1;
        *entry = PinState {
            resets,
            ..PinState::default()
        };
    }
}

// ============================================================================
// Delay
// ============================================================================

#[derive(Default)]
struct DelayState {
    gated: bool,
    permits: usize,
    waiting: usize,
    calls: Vec<u32>,
}

#[derive(Default)]
struct DelayGate {
    state: Mutex<DelayState>,
    cond: Condvar,
}

/// Mock delay that records requested durations.
///
/// An immediate delay returns at once. A gated delay blocks each call until
/// the test hands out a permit with [`release`](Self::release), which makes
/// guard windows fully deterministic. Clones share the same gate.
///
/// # Example
///
/// ```rust
/// use irq_io::hal::MockDelay;
/// use irq_io::traits::BlockingDelay;
///
/// let mut delay = MockDelay::immediate();
/// delay.delay_ms(5);
/// delay.delay_ms(7);
/// assert_eq!(delay.calls(), vec![5, 7]);
/// ```
#[derive(Clone, Default)]
pub struct MockDelay {
    gate: Arc<DelayGate>,
}

impl MockDelay {
    /// Delay that never blocks.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Delay that blocks until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        let delay = Self::default();
        lock(&delay.gate.state).gated = true;
        delay
    }

    /// Lets one pending or future delay call finish.
    pub fn release(&self) {
        lock(&self.gate.state).permits += 1;
        self.gate.cond.notify_all();
    }

    /// Turns the gate off; every current and future call returns at once.
    pub fn open(&self) {
        lock(&self.gate.state).gated = false;
        self.gate.cond.notify_all();
    }

    /// Number of calls currently blocked on the gate.
    pub fn waiting(&self) -> usize {
        lock(&self.gate.state).waiting
    }

    /// Durations requested so far, in order.
    pub fn calls(&self) -> Vec<u32> {
        lock(&self.gate.state).calls.clone()
    }
}

impl BlockingDelay for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        let mut state = lock(&self.gate.state);
        state.calls.push(ms);
        if !state.gated {
            return;
        }
        state.waiting += 1;
        let mut state = self
            .gate
            .cond
            .wait_while(state, |s| s.gated && s.permits == 0)
            .unwrap_or_else(PoisonError::into_inner);
        if state.gated {
            state.permits -= 1;
        }
        state.waiting -= 1;
    }
}

// ============================================================================
// UART
// ============================================================================

struct QueueInner {
    events: Mutex<VecDeque<Event>>,
    cond: Condvar,
    capacity: usize,
}

/// Bounded mock event queue.
///
/// [`post`](Self::post) plays the driver ISR: it never blocks and drops the
/// event when the queue is full. Clones share the same queue.
#[derive(Clone)]
pub struct MockEventQueue {
    inner: Arc<QueueInner>,
}

impl MockEventQueue {
    /// Creates an empty queue holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                events: Mutex::new(VecDeque::with_capacity(capacity)),
                cond: Condvar::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Enqueues `event` without blocking. Returns false if the queue is full.
    pub fn post(&self, event: Event) -> bool {
        let mut events = lock(&self.inner.events);
        if events.len() >= self.inner.capacity {
            return false;
        }
        events.push_back(event);
        self.inner.cond.notify_all();
        true
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        lock(&self.inner.events).len()
    }

    /// Returns true if no event is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the queued events, oldest first.
    pub fn pending(&self) -> Vec<Event> {
        lock(&self.inner.events).iter().copied().collect()
    }
}

impl EventQueue for MockEventQueue {
    fn recv(&self) -> Event {
        let mut events = self
            .inner
            .cond
            .wait_while(lock(&self.inner.events), |events| events.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let event = events.pop_front().unwrap_or(Event::Shutdown);
        self.inner.cond.notify_all();
        event
    }

    fn try_recv(&self) -> Option<Event> {
        let event = lock(&self.inner.events).pop_front();
        if event.is_some() {
            self.inner.cond.notify_all();
        }
        event
    }

    fn send(&self, event: Event) {
        let capacity = self.inner.capacity;
        let mut events = self
            .inner
            .cond
            .wait_while(lock(&self.inner.events), |events| events.len() >= capacity)
            .unwrap_or_else(PoisonError::into_inner);
        events.push_back(event);
        self.inner.cond.notify_all();
    }

}

#[derive(Default)]
struct UartState {
    rx: VecDeque<u8>,
    after_flush: Vec<u8>,
    tx: Vec<u8>,
    accept_limit: Option<usize>,
    fail_install: Option<DriverError>,
    queue: Option<MockEventQueue>,
    installs: usize,
    uninstalls: usize,
    flushes: usize,
}

/// Mock UART driver.
///
/// Bytes pushed with [`push_rx`](Self::push_rx) are what the channel reads;
/// written bytes are captured for inspection. The event queue created by
/// `install` stays reachable through [`queue`](Self::queue).
///
/// # Example
///
/// ```rust
/// use irq_io::hal::MockUart;
/// use irq_io::traits::UartDriver;
///
/// let uart = MockUart::new().with_accept_limit(2);
/// assert_eq!(uart.write(b"abcd"), 2);
/// assert_eq!(uart.written(), b"ab".to_vec());
/// ```
#[derive(Default)]
pub struct MockUart {
    state: Mutex<UartState>,
}

impl MockUart {
    /// Creates an idle driver that accepts every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts at most `limit` bytes per write.
    pub fn with_accept_limit(self, limit: usize) -> Self {
        self.set_accept_limit(Some(limit));
        self
    }

    /// Changes the per-write limit; `None` accepts everything.
    pub fn set_accept_limit(&self, limit: Option<usize>) {
        lock(&self.state).accept_limit = limit;
    }

    /// Makes the next `install` fail with `error`.
    pub fn fail_install(&self, error: DriverError) {
        lock(&self.state).fail_install = Some(error);
    }

    /// Appends bytes to the receive buffer.
    pub fn push_rx(&self, data: &[u8]) {
        lock(&self.state).rx.extend(data.iter().copied());
    }

    /// Holds bytes back until the next `flush_input`, then appends them.
    ///
    /// Models data that arrives on the line right after a resync.
    pub fn push_rx_after_flush(&self, data: &[u8]) {
        lock(&self.state).after_flush.extend_from_slice(data);
    }

    /// Bytes waiting in the receive buffer.
    pub fn rx_pending(&self) -> usize {
        lock(&self.state).rx.len()
    }

    /// Every byte accepted by `write` so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).tx.clone()
    }

    /// Event queue of the current installation.
    pub fn queue(&self) -> Option<MockEventQueue> {
        lock(&self.state).queue.clone()
    }

    /// Pushes bytes and posts the matching `DataReady` event.
    ///
    /// Returns false if the driver is not installed or the queue is full.
    pub fn receive(&self, data: &[u8]) -> bool {
        self.push_rx(data);
        self.queue()
            .is_some_and(|queue| queue.post(Event::DataReady(data.len())))
    }

    /// Number of successful `install` calls.
    pub fn install_count(&self) -> usize {
        lock(&self.state).installs
    }

    /// Number of `uninstall` calls.
    pub fn uninstall_count(&self) -> usize {
        lock(&self.state).uninstalls
    }

    /// Number of `flush_input` calls.
    pub fn flush_count(&self) -> usize {
        lock(&self.state).flushes
    }
}

impl UartDriver for MockUart {
    type Queue = MockEventQueue;

    fn install(&self, config: &UartConfig) -> Result<MockEventQueue, DriverError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.fail_install.take() {
            return Err(error);
        }
        let queue = MockEventQueue::new(config.event_queue_size);
        state.queue = Some(queue.clone());
        state.installs += 1;
        Ok(queue)
    }

    fn uninstall(&self) {
        let mut state = lock(&self.state);
        state.queue = None;
        state.uninstalls += 1;
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        let mut state = lock(&self.state);
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn write(&self, data: &[u8]) -> usize {
        let mut state = lock(&self.state);
        let n = state.accept_limit.map_or(data.len(), |limit| data.len().min(limit));
        state.tx.extend_from_slice(&data[..n]);
        n
    }

    fn flush_input(&self) {
        let mut state = lock(&self.state);
        state.rx.clear();
        let arrived = core::mem::take(&mut state.after_flush);
        state.rx.extend(arrived);
        state.flushes += 1;
    }
}

// ============================================================================
// Timer
// ============================================================================

#[derive(Default, Clone, Copy)]
struct UnitState {
    divider: Option<u32>,
    running: bool,
    counter: u64,
    alarm: u64,
    intr_flags: Option<i32>,
    router: Option<&'static TimerBank<MockTimer>>,
}

#[derive(Default)]
struct TimerState {
    units: [UnitState; TimerUnit::COUNT],
    fail_next_init: Option<HalError>,
    marks: Vec<usize>,
}

/// Mock timer groups advanced by hand.
///
/// # Example
///
/// ```rust
/// use irq_io::hal::MockTimer;
/// use irq_io::traits::{TimerHal, TimerUnit};
///
/// let timer = MockTimer::new();
/// timer.init(TimerUnit::Group0Timer0, 2, 100).unwrap();
/// timer.start(TimerUnit::Group0Timer0);
/// timer.advance(TimerUnit::Group0Timer0, 30);
/// assert_eq!(timer.counter(TimerUnit::Group0Timer0), 30);
/// ```
#[derive(Default)]
pub struct MockTimer {
    state: Mutex<TimerState>,
}

impl MockTimer {
    /// Creates timer groups with every unit released.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances a running unit by `ticks`, delivering every alarm crossed.
    pub fn advance(&self, unit: TimerUnit, ticks: u64) {
        let (fires, router) = {
            let mut state = lock(&self.state);
            let u = &mut state.units[unit.index()];
            if !u.running {
                return;
            }
            u.counter += ticks;
            if u.alarm == 0 || u.counter < u.alarm {
                return;
            }
            let fires = u.counter / u.alarm;
            u.counter %= u.alarm;
            (fires, u.router)
        };
        if let Some(bank) = router {
            for _ in 0..fires {
                bank.handle_alarm(unit);
            }
        }
    }

    /// Makes the next `init` call fail with `error`.
    pub fn fail_next_init(&self, error: HalError) {
        lock(&self.state).fail_next_init = Some(error);
    }

    /// Appends a marker; used by reactions under test.
    pub fn record_mark(&self, mark: usize) {
        lock(&self.state).marks.push(mark);
    }

    /// Markers recorded so far.
    pub fn marks(&self) -> Vec<usize> {
        lock(&self.state).marks.clone()
    }

    /// Divider of an initialized unit.
    pub fn divider(&self, unit: TimerUnit) -> Option<u32> {
        lock(&self.state).units[unit.index()].divider
    }

    /// Current alarm value of `unit`.
    pub fn alarm(&self, unit: TimerUnit) -> u64 {
        lock(&self.state).units[unit.index()].alarm
    }

    /// Returns true if `unit` is counting.
    pub fn is_running(&self, unit: TimerUnit) -> bool {
        lock(&self.state).units[unit.index()].running
    }

    /// Interrupt flags passed to `install_isr`.
    pub fn intr_flags(&self, unit: TimerUnit) -> Option<i32> {
        lock(&self.state).units[unit.index()].intr_flags
    }

    /// Returns true if an alarm handler is installed for `unit`.
    pub fn isr_installed(&self, unit: TimerUnit) -> bool {
        lock(&self.state).units[unit.index()].router.is_some()
    }
}

impl TimerHal for MockTimer {
    fn init(&self, unit: TimerUnit, divider: u32, alarm_ticks: u64) -> Result<(), HalError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.fail_next_init.take() {
            return Err(error);
        }
        state.units[unit.index()] = UnitState {
            divider: Some(divider),
            alarm: alarm_ticks,
            ..UnitState::default()
        };
        Ok(())
    }

    fn deinit(&self, unit: TimerUnit) {
        lock(&self.state).units[unit.index()] = UnitState::default();
    }

    fn start(&self, unit: TimerUnit) {
        lock(&self.state).units[unit.index()].running = true;
    }

    fn pause(&self, unit: TimerUnit) {
        lock(&self.state).units[unit.index()].running = false;
    }

    fn counter(&self, unit: TimerUnit) -> u64 {
        lock(&self.state).units[unit.index()].counter
    }

    fn set_counter(&self, unit: TimerUnit, ticks: u64) {
        lock(&self.state).units[unit.index()].counter = ticks;
    }

    fn set_alarm(&self, unit: TimerUnit, ticks: u64) {
        lock(&self.state).units[unit.index()].alarm = ticks;
    }

    fn install_isr(
        &self,
        unit: TimerUnit,
        router: &'static TimerBank<Self>,
        intr_flags: i32,
    ) -> Result<(), HalError> {
        let mut state = lock(&self.state);
        let u = &mut state.units[unit.index()];
        u.router = Some(router);
        u.intr_flags = Some(intr_flags);
        Ok(())
    }

    fn remove_isr(&self, unit: TimerUnit) {
        lock(&self.state).units[unit.index()].router = None;
    }
}
