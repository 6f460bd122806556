//! Integration tests for the UART event-queue channel

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use irq_io::{
    hal::{MockEventQueue, MockUart},
    ChannelConsumer, DriverError, Event, HalError, TxOutcome, UartChannel, UartConfig,
};
use proptest::prelude::*;

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Consumer that keeps every payload it is handed.
#[derive(Clone, Default)]
struct Recorder {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Recorder {
    fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }

    fn lengths(&self) -> Vec<usize> {
        self.payloads().iter().map(Vec::len).collect()
    }
}

impl ChannelConsumer for Recorder {
    fn on_data(&self, data: &[u8]) {
        self.payloads.lock().unwrap().push(data.to_vec());
    }
}

/// Recorder that holds every delivery until the gate opens.
#[derive(Clone, Default)]
struct GatedRecorder {
    recorder: Recorder,
    open: Arc<(Mutex<bool>, Condvar)>,
    entered: Arc<AtomicUsize>,
}

impl GatedRecorder {
    fn open(&self) {
        let (lock, cond) = &*self.open;
        *lock.lock().unwrap() = true;
        cond.notify_all();
    }

    fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

impl ChannelConsumer for GatedRecorder {
    fn on_data(&self, data: &[u8]) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let (lock, cond) = &*self.open;
        let _open = cond.wait_while(lock.lock().unwrap(), |open| !*open).unwrap();
        self.recorder.on_data(data);
    }
}

fn started(recorder: &Recorder) -> (UartChannel<MockUart>, MockEventQueue) {
    let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
    channel.initialize_with(recorder.clone()).unwrap();
    let queue = channel.driver().queue().unwrap();
    (channel, queue)
}

// ============================================================================
// Event Handling Tests
// ============================================================================

#[test]
fn overflow_between_payloads_is_recovered() {
    let recorder = Recorder::default();
    let (mut channel, queue) = started(&recorder);
    let uart = channel.driver();

    uart.push_rx(&[0xAA; 10]);
    assert!(queue.post(Event::DataReady(10)));
    assert!(wait_until(|| channel.stats().data_events == 1));

    assert!(queue.post(Event::FifoOverflow));
    assert!(wait_until(|| channel.stats().resyncs == 1));
    assert_eq!(uart.flush_count(), 1);

    uart.push_rx(&[0x55; 5]);
    assert!(queue.post(Event::DataReady(5)));
    assert!(wait_until(|| channel.stats().data_events == 2));

    channel.deinitialize();
    assert_eq!(recorder.lengths(), vec![10, 5]);
    assert_eq!(channel.driver().uninstall_count(), 1);

    // The worker is gone; nothing else is delivered
    assert!(!channel.driver().receive(b"late"));
    assert_eq!(recorder.lengths(), vec![10, 5]);
}

#[test]
fn overflow_keeps_events_queued_behind_it() {
    let gated = GatedRecorder::default();
    let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
    channel.initialize_with(gated.clone()).unwrap();
    let queue = channel.driver().queue().unwrap();
    let uart = channel.driver();

    // Worker is busy delivering the first payload while the rest queues up
    uart.push_rx(&[0xAA; 10]);
    assert!(queue.post(Event::DataReady(10)));
    assert!(wait_until(|| gated.entered() == 1));

    uart.push_rx(b"stale bytes");
    uart.push_rx_after_flush(&[0x55; 5]);
    assert!(queue.post(Event::FifoOverflow));
    assert!(queue.post(Event::DataReady(5)));
    assert!(queue.post(Event::Shutdown));
    assert_eq!(queue.len(), 3);

    gated.open();
    assert!(wait_until(|| channel.stats().data_events == 2));
    channel.deinitialize();

    assert_eq!(gated.recorder.lengths(), vec![10, 5]);
    assert_eq!(gated.recorder.payloads()[1], vec![0x55; 5]);
    let stats = channel.stats();
    assert_eq!(stats.resyncs, 1);
    assert_eq!(stats.events, 3);
    assert_eq!(channel.driver().flush_count(), 1);
}

#[test]
fn teardown_behind_pending_overflow_completes() {
    let gated = GatedRecorder::default();
    let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
    channel.initialize_with(gated.clone()).unwrap();
    let queue = channel.driver().queue().unwrap();

    channel.driver().push_rx(b"x");
    assert!(queue.post(Event::DataReady(1)));
    assert!(wait_until(|| gated.entered() == 1));
    assert!(queue.post(Event::FifoOverflow));

    let (done_tx, done_rx) = mpsc::channel();
    let teardown = thread::spawn(move || {
        channel.deinitialize();
        let _ = done_tx.send(channel.stats());
        channel
    });

    // Sentinel lands behind the overflow, then the worker is let go
    assert!(wait_until(|| queue.pending() == vec![Event::FifoOverflow, Event::Shutdown]));
    gated.open();

    let stats = done_rx
        .recv_timeout(Duration::from_secs(3))
        .expect("deinitialize did not return");
    assert_eq!(stats.resyncs, 1);
    let channel = teardown.join().unwrap();
    assert!(!channel.is_initialized());
    assert_eq!(channel.driver().uninstall_count(), 1);
}

#[test]
fn overflow_discards_pending_input() {
    let recorder = Recorder::default();
    let (channel, queue) = started(&recorder);

    channel.driver().push_rx(b"stale");
    assert!(queue.post(Event::BufferFull));
    assert!(wait_until(|| channel.stats().resyncs == 1));
    assert_eq!(channel.driver().rx_pending(), 0);
    assert!(recorder.payloads().is_empty());
}

#[test]
fn line_errors_and_unknown_events_are_counted() {
    let recorder = Recorder::default();
    let (channel, queue) = started(&recorder);

    for event in [
        Event::Break,
        Event::ParityError,
        Event::FrameError,
        Event::Other(27),
        Event::DataReady(0),
    ] {
        assert!(queue.post(event));
    }
    assert!(wait_until(|| channel.stats().events == 5));

    let stats = channel.stats();
    assert_eq!(stats.line_errors, 3);
    assert_eq!(stats.unknown_events, 1);
    assert_eq!(stats.empty_reads, 1);
    assert_eq!(stats.data_events, 0);
    assert!(recorder.payloads().is_empty());
}

#[test]
fn payload_without_consumer_is_drained() {
    let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
    channel.initialize().unwrap();
    assert!(!channel.has_consumer());

    assert!(channel.driver().receive(b"dropped"));
    assert!(wait_until(|| channel.stats().undelivered == 1));
    assert_eq!(channel.driver().rx_pending(), 0);
}

#[test]
fn consumer_swap_takes_effect_for_next_payload() {
    let first = Recorder::default();
    let second = Recorder::default();
    let (channel, _queue) = started(&first);

    channel.driver().receive(b"one");
    assert!(wait_until(|| channel.stats().data_events == 1));
    channel.set_consumer(second.clone());
    channel.driver().receive(b"two");
    assert!(wait_until(|| channel.stats().data_events == 2));

    assert_eq!(first.payloads(), vec![b"one".to_vec()]);
    assert_eq!(second.payloads(), vec![b"two".to_vec()]);
}

// ============================================================================
// Transmit Tests
// ============================================================================

#[test]
fn partial_write_is_reported_not_fatal() {
    let mut channel = UartChannel::new(MockUart::new().with_accept_limit(4), UartConfig::default());
    channel.initialize().unwrap();

    assert_eq!(
        channel.tx(b"abcdefgh"),
        TxOutcome::Partial {
            sent: 4,
            requested: 8
        }
    );
    assert!(channel.is_initialized());

    channel.driver().set_accept_limit(None);
    assert_eq!(channel.tx(b"xyz"), TxOutcome::Sent(3));
    assert_eq!(channel.driver().written(), b"abcdxyz".to_vec());

    let stats = channel.stats();
    assert_eq!(stats.partial_writes, 1);
    assert_eq!(stats.bytes_sent, 7);
}

#[test]
fn tx_before_initialize_is_skipped() {
    let channel = UartChannel::new(MockUart::new(), UartConfig::default());
    let outcome = channel.tx(b"early");
    assert_eq!(outcome, TxOutcome::Skipped);
    assert_eq!(outcome.sent(), 0);
    assert!(channel.driver().written().is_empty());
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn failed_install_leaves_channel_down() {
    let uart = MockUart::new();
    uart.fail_install(DriverError::Install(HalError::FAIL));
    let mut channel = UartChannel::new(uart, UartConfig::default());

    assert_eq!(
        channel.initialize(),
        Err(DriverError::Install(HalError::FAIL))
    );
    assert!(!channel.is_initialized());

    // Next attempt succeeds
    channel.initialize().unwrap();
    assert!(channel.is_initialized());
}

#[test]
fn initialize_and_deinitialize_are_idempotent() {
    let mut channel = UartChannel::new(MockUart::new(), UartConfig::default());
    channel.initialize().unwrap();
    channel.initialize().unwrap();
    assert_eq!(channel.driver().install_count(), 1);

    channel.deinitialize();
    channel.deinitialize();
    assert_eq!(channel.driver().uninstall_count(), 1);
}

#[test]
fn channel_can_be_restarted() {
    let recorder = Recorder::default();
    let (mut channel, _queue) = started(&recorder);
    channel.deinitialize();
    assert!(!channel.has_consumer());

    channel.initialize_with(recorder.clone()).unwrap();
    channel.driver().receive(b"again");
    assert!(wait_until(|| recorder.payloads().len() == 1));
    assert_eq!(channel.driver().install_count(), 2);
}

#[test]
fn events_queued_before_teardown_are_handled() {
    let recorder = Recorder::default();
    let (mut channel, queue) = started(&recorder);

    for _ in 0..4 {
        assert!(queue.post(Event::Break));
    }
    channel.deinitialize();

    // The sentinel is not counted
    assert_eq!(channel.stats().events, 4);
    assert_eq!(channel.stats().line_errors, 4);
}

// ============================================================================
// Ordering Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn payloads_arrive_in_order(
        batches in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 1..24),
            1..16,
        )
    ) {
        let recorder = Recorder::default();
        let (mut channel, _queue) = started(&recorder);

        for batch in &batches {
            prop_assert!(channel.driver().receive(batch));
        }
        let expected = batches.len() as u32;
        prop_assert!(wait_until(|| channel.stats().data_events == expected));
        channel.deinitialize();

        prop_assert_eq!(recorder.payloads(), batches);
    }
}
