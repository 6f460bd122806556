//! UART event-queue channel with a background worker.
//!
//! The driver layer turns hardware interrupts into classified [`Event`]s on
//! a bounded queue. One worker thread per channel blocks on that queue and
//! handles events strictly in order:
//!
//! | Event | Handling |
//! |-------|----------|
//! | `DataReady(0)` | Logged and counted |
//! | `DataReady(n)` | Up to `n` bytes read and handed to the consumer |
//! | `FifoOverflow`, `BufferFull` | Input flushed, queue drained into the backlog |
//! | `Break`, `ParityError`, `FrameError` | Logged and counted |
//! | `Other(code)` | Logged and counted |
//! | `Shutdown` | Handshake acknowledged, worker returns |
//!
//! Overflow recovery never discards events. Whatever is already queued moves
//! into a worker-local backlog, oldest first, which frees the driver's queue
//! slots and keeps enqueue order. The worker empties the backlog before it
//! blocks on the queue again.
//!
//! Teardown always goes through the [`ShutdownHandshake`]: the sentinel is
//! posted, the worker acknowledges, the thread is joined and only then is
//! the driver uninstalled.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use irq_io::hal::MockUart;
//! use irq_io::{TxOutcome, UartChannel, UartConfig};
//!
//! let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
//! let received = Arc::new(Mutex::new(Vec::new()));
//! let sink = received.clone();
//! channel
//!     .initialize_with(move |data: &[u8]| sink.lock().unwrap().extend_from_slice(data))
//!     .unwrap();
//!
//! assert_eq!(channel.tx(b"ping"), TxOutcome::Sent(4));
//! channel.deinitialize();
//! assert!(!channel.is_initialized());
//! ```

use core::ops::ControlFlow;
use core::sync::atomic::{AtomicU32, Ordering};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::config::UartConfig;
use crate::error::DriverError;
use crate::lifecycle::{ExitNotice, ShutdownHandshake};
use crate::traits::{Event, EventQueue, UartDriver};

const TAG: &str = "[UART]";

// ============================================================================
// Consumer
// ============================================================================

/// Receiver of bytes read by the channel worker.
///
/// Called on the worker thread, never concurrently with another dispatch.
/// Closures taking `&[u8]` implement this trait.
pub trait ChannelConsumer: Send + Sync {
    /// Handles one batch of received bytes.
    fn on_data(&self, data: &[u8]);
}

impl<F> ChannelConsumer for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn on_data(&self, data: &[u8]) {
        self(data)
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Live counters updated by the worker and by [`UartChannel::tx`].
#[derive(Debug, Default)]
pub struct ChannelStats {
    events: AtomicU32,
    data_events: AtomicU32,
    bytes_received: AtomicU32,
    empty_reads: AtomicU32,
    undelivered: AtomicU32,
    resyncs: AtomicU32,
    line_errors: AtomicU32,
    unknown_events: AtomicU32,
    bytes_sent: AtomicU32,
    partial_writes: AtomicU32,
}

/// Point-in-time copy of [`ChannelStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatsSnapshot {
    /// Events handled, excluding the shutdown sentinel.
    pub events: u32,
    /// Non-empty `DataReady` events.
    pub data_events: u32,
    /// Bytes read from the driver.
    pub bytes_received: u32,
    /// `DataReady` events that yielded no bytes.
    pub empty_reads: u32,
    /// Payloads read while no consumer was registered.
    pub undelivered: u32,
    /// Overflow recoveries (input flush plus queue drain).
    pub resyncs: u32,
    /// Break, parity and framing errors.
    pub line_errors: u32,
    /// Unclassified driver events.
    pub unknown_events: u32,
    /// Bytes accepted by the driver for transmission.
    pub bytes_sent: u32,
    /// Writes the driver accepted only partially.
    pub partial_writes: u32,
}

impl ChannelStats {
    /// Copies every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |counter: &AtomicU32| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            events: get(&self.events),
            data_events: get(&self.data_events),
            bytes_received: get(&self.bytes_received),
            empty_reads: get(&self.empty_reads),
            undelivered: get(&self.undelivered),
            resyncs: get(&self.resyncs),
            line_errors: get(&self.line_errors),
            unknown_events: get(&self.unknown_events),
            bytes_sent: get(&self.bytes_sent),
            partial_writes: get(&self.partial_writes),
        }
    }
}

fn bump(counter: &AtomicU32, by: usize) {
    counter.fetch_add(u32::try_from(by).unwrap_or(u32::MAX), Ordering::Relaxed);
}

// ============================================================================
// Tx result
// ============================================================================

/// Result of [`UartChannel::tx`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxOutcome {
    /// Every byte was accepted.
    Sent(usize),
    /// The driver accepted fewer bytes than requested. The channel stays usable.
    Partial {
        /// Bytes accepted.
        sent: usize,
        /// Bytes requested.
        requested: usize,
    },
    /// The channel is not initialized; nothing was written.
    Skipped,
}

impl TxOutcome {
    /// Returns true if every requested byte was accepted.
    pub fn is_complete(&self) -> bool {
        matches!(self, TxOutcome::Sent(_))
    }

    /// Bytes accepted by the driver.
    pub fn sent(&self) -> usize {
        match *self {
            TxOutcome::Sent(n) => n,
            TxOutcome::Partial { sent, .. } => sent,
            TxOutcome::Skipped => 0,
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

type SharedConsumer = Arc<dyn ChannelConsumer>;

#[derive(Default)]
struct Shared {
    consumer: Mutex<Option<SharedConsumer>>,
    stats: ChannelStats,
    handshake: ShutdownHandshake,
}

impl Shared {
    fn consumer(&self) -> MutexGuard<'_, Option<SharedConsumer>> {
        self.consumer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handles one event at a time on behalf of the worker.
struct EventDispatcher<'a, D: UartDriver> {
    driver: &'a D,
    queue: &'a D::Queue,
    shared: &'a Shared,
    backlog: VecDeque<Event>,
    backlog_limit: usize,
}

impl<'a, D: UartDriver> EventDispatcher<'a, D> {
    fn new(driver: &'a D, queue: &'a D::Queue, shared: &'a Shared, backlog_limit: usize) -> Self {
        Self {
            driver,
            queue,
            shared,
            backlog: VecDeque::with_capacity(backlog_limit),
            backlog_limit: backlog_limit.max(1),
        }
    }

    /// Next event in enqueue order: backlog first, then the queue.
    fn next_event(&mut self) -> Event {
        match self.backlog.pop_front() {
            Some(event) => event,
            None => self.queue.recv(),
        }
    }

    fn dispatch(&mut self, event: Event) -> ControlFlow<()> {
        let shared = self.shared;
        let stats = &shared.stats;
        if event != Event::Shutdown {
            bump(&stats.events, 1);
        }
        match event {
            Event::DataReady(0) => {
                bump(&stats.empty_reads, 1);
                diag_warn!(TAG, "data event without bytes");
            }
            Event::DataReady(len) => self.receive(len),
            Event::FifoOverflow | Event::BufferFull => {
                diag_warn!(TAG, "{:?}, flushing input", event);
                self.driver.flush_input();
                let moved = self.drain_queue();
                bump(&stats.resyncs, 1);
                if moved > 0 {
                    diag_info!(TAG, "{} queued events carried over", moved);
                }
            }
            Event::Break => {
                bump(&stats.line_errors, 1);
                diag_warn!(TAG, "rx break");
            }
            Event::ParityError | Event::FrameError => {
                bump(&stats.line_errors, 1);
                diag_error!(TAG, "{:?}", event);
            }
            Event::Other(code) => {
                bump(&stats.unknown_events, 1);
                diag_warn!(TAG, "unknown event type: {}", code);
            }
            Event::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Moves queued events into the backlog until it holds `backlog_limit`.
    ///
    /// Events past the limit stay queued. Nothing is dropped, the shutdown
    /// sentinel included.
    fn drain_queue(&mut self) -> usize {
        let mut moved = 0;
        while self.backlog.len() < self.backlog_limit {
            let Some(event) = self.queue.try_recv() else {
                break;
            };
            self.backlog.push_back(event);
            moved += 1;
        }
        moved
    }

    fn receive(&self, len: usize) {
        let stats = &self.shared.stats;
        let mut buffer = vec![0u8; len];
        let read = self.driver.read(&mut buffer);
        if read == 0 {
            bump(&stats.empty_reads, 1);
            diag_warn!(TAG, "data event for {} bytes, nothing to read", len);
            return;
        }
        bump(&stats.data_events, 1);
        bump(&stats.bytes_received, read);
        diag_info!(TAG, "received {} bytes", read);

        // Clone out so a consumer swap never waits on a running dispatch.
        let consumer = self.shared.consumer().clone();
        match consumer {
            Some(consumer) => consumer.on_data(&buffer[..read]),
            None => bump(&stats.undelivered, 1),
        }
    }
}

fn run_worker<D: UartDriver>(
    driver: Arc<D>,
    queue: Arc<D::Queue>,
    shared: Arc<Shared>,
    backlog_limit: usize,
) {
    let _notice = ExitNotice::new(&shared.handshake);
    let mut dispatcher = EventDispatcher::new(&*driver, &*queue, &shared, backlog_limit);
    loop {
        let event = dispatcher.next_event();
        if dispatcher.dispatch(event).is_break() {
            break;
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

struct Link<D: UartDriver> {
    queue: Arc<D::Queue>,
    worker: JoinHandle<()>,
}

/// Serial channel driven by a UART event queue.
///
/// Dropping the channel deinitializes it.
pub struct UartChannel<D: UartDriver> {
    driver: Arc<D>,
    config: UartConfig,
    shared: Arc<Shared>,
    link: Option<Link<D>>,
}

impl<D: UartDriver> UartChannel<D> {
    /// Creates an uninitialized channel.
    pub fn new(driver: D, config: UartConfig) -> Self {
        Self {
            driver: Arc::new(driver),
            config,
            shared: Arc::new(Shared::default()),
            link: None,
        }
    }

    /// Installs the driver and starts the worker.
    ///
    /// Does nothing if the channel is already initialized.
    ///
    /// # Errors
    ///
    /// The [`DriverError`] of the failed bring-up step. The channel stays
    /// uninitialized and the driver is not left installed.
    pub fn initialize(&mut self) -> Result<(), DriverError> {
        if self.link.is_some() {
            return Ok(());
        }

        let queue = Arc::new(self.driver.install(&self.config)?);
        self.shared.handshake.arm();

        let spawned = {
            let driver = self.driver.clone();
            let queue = queue.clone();
            let shared = self.shared.clone();
            let backlog_limit = self.config.event_queue_size;
            thread::Builder::new()
                .name(self.config.worker.name.as_str().into())
                .stack_size(self.config.worker.stack_size)
                .spawn(move || run_worker(driver, queue, shared, backlog_limit))
        };
        let worker = match spawned {
            Ok(worker) => worker,
            Err(_) => {
                diag_error!(TAG, "event worker spawn failed");
                self.driver.uninstall();
                return Err(DriverError::WorkerSpawn);
            }
        };

        self.link = Some(Link { queue, worker });
        diag_info!(
            TAG,
            "UART{} initialized at {} baud",
            self.config.port,
            self.config.baud_rate
        );
        Ok(())
    }

    /// Initializes if needed, then registers `consumer`.
    ///
    /// The consumer is replaced even when the channel was already up.
    pub fn initialize_with<C>(&mut self, consumer: C) -> Result<(), DriverError>
    where
        C: ChannelConsumer + 'static,
    {
        self.initialize()?;
        self.set_consumer(consumer);
        Ok(())
    }

    /// Registers `consumer`, replacing any previous one.
    ///
    /// A dispatch already running finishes with the consumer it started with.
    pub fn set_consumer<C>(&self, consumer: C)
    where
        C: ChannelConsumer + 'static,
    {
        *self.shared.consumer() = Some(Arc::new(consumer));
    }

    /// Removes the consumer. Later payloads are drained and counted as undelivered.
    pub fn clear_consumer(&self) {
        *self.shared.consumer() = None;
    }

    /// Returns true if a consumer is registered.
    pub fn has_consumer(&self) -> bool {
        self.shared.consumer().is_some()
    }

    /// Writes `data` through the driver.
    ///
    /// A short write is logged and reported as [`TxOutcome::Partial`]; it is
    /// never an error.
    pub fn tx(&self, data: &[u8]) -> TxOutcome {
        if self.link.is_none() {
            return TxOutcome::Skipped;
        }
        let sent = self.driver.write(data);
        bump(&self.shared.stats.bytes_sent, sent);
        if sent < data.len() {
            bump(&self.shared.stats.partial_writes, 1);
            diag_error!(
                TAG,
                "tx failed: transmitted {} bytes, size {}",
                sent,
                data.len()
            );
            return TxOutcome::Partial {
                sent,
                requested: data.len(),
            };
        }
        TxOutcome::Sent(sent)
    }

    /// Stops the worker and uninstalls the driver.
    ///
    /// Clears the consumer first, then posts the shutdown sentinel and waits
    /// for the worker to acknowledge it. Every event queued before the
    /// sentinel is handled before this returns. Does nothing if the channel
    /// is not initialized, apart from clearing the consumer.
    pub fn deinitialize(&mut self) {
        self.clear_consumer();
        let Some(Link { queue, worker }) = self.link.take() else {
            return;
        };

        self.shared
            .handshake
            .initiate(|| queue.send(Event::Shutdown));
        if worker.join().is_err() {
            diag_warn!(TAG, "event worker panicked");
        }
        self.driver.uninstall();
        diag_info!(TAG, "UART{} deinitialized", self.config.port);
    }

    /// Returns true between a successful `initialize` and `deinitialize`.
    pub fn is_initialized(&self) -> bool {
        self.link.is_some()
    }

    /// Channel configuration.
    pub fn config(&self) -> &UartConfig {
        &self.config
    }

    /// Underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Copies the channel counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl<D: UartDriver> Drop for UartChannel<D> {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockEventQueue, MockUart};
    use std::sync::Mutex;

    fn dispatcher_parts() -> (MockUart, MockEventQueue, Shared) {
        (MockUart::new(), MockEventQueue::new(8), Shared::default())
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    #[test]
    fn data_ready_reads_and_delivers() {
        let (uart, queue, shared) = dispatcher_parts();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        *shared.consumer() = Some(Arc::new(move |data: &[u8]| {
            sink.lock().unwrap().push(data.to_vec())
        }));
        uart.push_rx(b"hello");

        let mut dispatcher = EventDispatcher::new(&uart, &queue, &shared, 8);
        assert!(dispatcher.dispatch(Event::DataReady(5)).is_continue());

        assert_eq!(*seen.lock().unwrap(), vec![b"hello".to_vec()]);
        let stats = shared.stats.snapshot();
        assert_eq!((stats.data_events, stats.bytes_received), (1, 5));
    }

    #[test]
    fn data_ready_delivers_only_bytes_read() {
        let (uart, queue, shared) = dispatcher_parts();
        let lengths = Arc::new(Mutex::new(Vec::new()));
        let sink = lengths.clone();
        *shared.consumer() = Some(Arc::new(move |data: &[u8]| {
            sink.lock().unwrap().push(data.len())
        }));
        uart.push_rx(b"abc");

        let mut dispatcher = EventDispatcher::new(&uart, &queue, &shared, 8);
        let _ = dispatcher.dispatch(Event::DataReady(10));
        assert_eq!(*lengths.lock().unwrap(), vec![3]);
    }

    #[test]
    fn empty_data_event_is_counted_only() {
        let (uart, queue, shared) = dispatcher_parts();
        let mut dispatcher = EventDispatcher::new(&uart, &queue, &shared, 8);
        let _ = dispatcher.dispatch(Event::DataReady(0));
        let stats = shared.stats.snapshot();
        assert_eq!((stats.empty_reads, stats.data_events), (1, 0));
    }

    #[test]
    fn data_without_consumer_is_drained() {
        let (uart, queue, shared) = dispatcher_parts();
        uart.push_rx(b"lost");
        let mut dispatcher = EventDispatcher::new(&uart, &queue, &shared, 8);
        let _ = dispatcher.dispatch(Event::DataReady(4));
        assert_eq!(uart.rx_pending(), 0);
        assert_eq!(shared.stats.snapshot().undelivered, 1);
    }

    #[test]
    fn data_event_with_nothing_to_read_is_not_delivered() {
        let (uart, queue, shared) = dispatcher_parts();
        let calls = Arc::new(AtomicU32::new(0));
        let sink = calls.clone();
        *shared.consumer() = Some(Arc::new(move |_: &[u8]| {
            sink.fetch_add(1, Ordering::Relaxed);
        }));
        let mut dispatcher = EventDispatcher::new(&uart, &queue, &shared, 8);
        let _ = dispatcher.dispatch(Event::DataReady(6));

        assert_eq!(calls.load(Ordering::Relaxed), 0);
        let stats = shared.stats.snapshot();
        assert_eq!((stats.empty_reads, stats.data_events), (1, 0));
    }

    #[test]
    fn overflow_flushes_and_carries_queued_events_over() {
        let (uart, queue, shared) = dispatcher_parts();
        uart.push_rx(b"garbage");
        assert!(queue.post(Event::DataReady(7)));
        assert!(queue.post(Event::Shutdown));
        let mut dispatcher = EventDispatcher::new(&uart, &queue, &shared, 8);

        assert!(dispatcher.dispatch(Event::FifoOverflow).is_continue());
        assert_eq!(uart.rx_pending(), 0);
        assert_eq!(uart.flush_count(), 1);
        assert!(queue.is_empty());

        // Later events go behind the carried-over ones
        assert!(queue.post(Event::Break));
        assert_eq!(dispatcher.next_event(), Event::DataReady(7));
        assert_eq!(dispatcher.next_event(), Event::Shutdown);
        assert_eq!(dispatcher.next_event(), Event::Break);
        assert_eq!(shared.stats.snapshot().resyncs, 1);
    }

    #[test]
    fn overflow_drain_stops_at_backlog_limit() {
        let (uart, queue, shared) = dispatcher_parts();
        for _ in 0..3 {
            assert!(queue.post(Event::Break));
        }
        let mut dispatcher = EventDispatcher::new(&uart, &queue, &shared, 2);

        let _ = dispatcher.dispatch(Event::BufferFull);
        assert_eq!(queue.len(), 1);
        for _ in 0..3 {
            assert_eq!(dispatcher.next_event(), Event::Break);
        }
    }

    #[test]
    fn line_errors_and_unknown_events_continue() {
        let (uart, queue, shared) = dispatcher_parts();
        let mut dispatcher = EventDispatcher::new(&uart, &queue, &shared, 8);
        for event in [
            Event::Break,
            Event::ParityError,
            Event::FrameError,
            Event::Other(42),
        ] {
            assert!(dispatcher.dispatch(event).is_continue());
        }
        let stats = shared.stats.snapshot();
        assert_eq!((stats.line_errors, stats.unknown_events, stats.events), (3, 1, 4));
    }

    #[test]
    fn shutdown_breaks_loop() {
        let (uart, queue, shared) = dispatcher_parts();
        let mut dispatcher = EventDispatcher::new(&uart, &queue, &shared, 8);
        assert!(dispatcher.dispatch(Event::Shutdown).is_break());
        assert_eq!(shared.stats.snapshot().events, 0);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[test]
    fn initialize_twice_installs_once() {
        let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
        channel.initialize().unwrap();
        channel.initialize().unwrap();
        assert_eq!(channel.driver().install_count(), 1);
        channel.deinitialize();
        assert_eq!(channel.driver().uninstall_count(), 1);
    }

    #[test]
    fn install_failure_leaves_channel_down() {
        let uart = MockUart::new();
        uart.fail_install(DriverError::ParamConfig(crate::traits::HalError::FAIL));
        let mut channel = UartChannel::new(uart, UartConfig::default());
        let err = channel.initialize().unwrap_err();
        assert!(matches!(err, DriverError::ParamConfig(_)));
        assert!(!channel.is_initialized());
        assert_eq!(channel.tx(b"x"), TxOutcome::Skipped);
    }

    #[test]
    fn initialize_with_replaces_consumer_when_up() {
        let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
        channel.initialize().unwrap();
        assert!(!channel.has_consumer());
        channel.initialize_with(|_: &[u8]| {}).unwrap();
        assert!(channel.has_consumer());
        assert_eq!(channel.driver().install_count(), 1);
    }

    #[test]
    fn deinitialize_clears_consumer_and_is_repeatable() {
        let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
        channel.initialize_with(|_: &[u8]| {}).unwrap();
        channel.deinitialize();
        channel.deinitialize();
        assert!(!channel.has_consumer());
        assert_eq!(channel.driver().uninstall_count(), 1);
    }

    #[test]
    fn channel_can_be_reinitialized() {
        let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
        channel.initialize().unwrap();
        channel.deinitialize();
        channel.initialize().unwrap();
        assert!(channel.is_initialized());
        drop(channel);
    }

    #[test]
    fn tx_outcome_accessors() {
        assert!(TxOutcome::Sent(3).is_complete());
        assert_eq!(TxOutcome::Partial { sent: 2, requested: 4 }.sent(), 2);
        assert_eq!(TxOutcome::Skipped.sent(), 0);
    }
}
