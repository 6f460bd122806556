//! Desktop simulation of the encoder and serial channel.
//!
//! Runs the decoder and a UART channel against the mock HAL, with this
//! program standing in for the hardware:
//! - Encoder edges are injected on the E2 line with E1 at either level
//! - Serial bursts are posted as driver events, including an overflow
//! - The channel is torn down with events still queued
//!
//! # Usage
//!
//! ```sh
//! cargo run --example desktop_sim
//! ```

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use irq_io::hal::{MockDelay, MockGpio, MockUart};
use irq_io::{Config, Decoder, DecoderState, Event, IrqHub, UartChannel};

fn main() {
    println!("=================================");
    println!("  irq-io Desktop Simulation");
    println!("=================================");
    println!();

    let config = Config::default();

    // =========================================================================
    // Encoder
    // =========================================================================
    let hub = IrqHub::leak(MockGpio::new());
    let delay = MockDelay::gated();
    let decoder = match Decoder::new(hub, &config.encoder, delay.clone()) {
        Ok(decoder) => decoder,
        Err(e) => {
            eprintln!("encoder setup failed: {}", e);
            return;
        }
    };
    let (e1, e2) = decoder.pins();
    println!("[OK] Decoder on E1={} E2={}", e1, e2);

    for (turn, e1_high) in [true, false, true].into_iter().enumerate() {
        hub.hal().set_level(e1, e1_high);
        hub.hal().trigger_edge(e2);
        // Bounce inside the guard window is masked
        hub.hal().trigger_edge(e2);
        println!("  turn {}: {:?}", turn, decoder.state());
        decoder.reset_state();
        delay.release();
        while !hub.hal().interrupt_enabled(e2) {
            thread::sleep(Duration::from_millis(1));
        }
    }
    if let Some(stats) = decoder.edge_stats() {
        println!(
            "  edges delivered={} masked={}",
            stats.delivered, stats.masked
        );
    }
    assert_eq!(decoder.state(), DecoderState::Idle);
    delay.open();
    drop(decoder);
    println!();

    // =========================================================================
    // Serial channel
    // =========================================================================
    let received = Arc::new(Mutex::new(Vec::<u8>::new()));
    let mut channel = UartChannel::new(MockUart::new(), config.uart.clone());
    let sink = received.clone();
    if let Err(e) = channel.initialize_with(move |payload: &[u8]| {
        if let Ok(mut buf) = sink.lock() {
            buf.extend_from_slice(payload);
        }
    }) {
        eprintln!("channel setup failed: {}", e);
        return;
    }
    println!("[OK] Channel on UART{}", config.uart.port);

    channel.driver().receive(b"hello ");
    channel.driver().receive(b"world");
    while channel.stats().data_events < 2 {
        thread::sleep(Duration::from_millis(1));
    }

    if let Some(queue) = channel.driver().queue() {
        queue.post(Event::FifoOverflow);
    }
    while channel.stats().resyncs < 1 {
        thread::sleep(Duration::from_millis(1));
    }

    let outcome = channel.tx(b"ack\r\n");
    println!("  tx: {:?}", outcome);

    channel.driver().receive(b"!");
    channel.deinitialize();

    let stats = channel.stats();
    println!(
        "  events={} bytes={} resyncs={}",
        stats.events, stats.bytes_received, stats.resyncs
    );
    if let Ok(buf) = received.lock() {
        println!("  payload: {:?}", String::from_utf8_lossy(&buf));
    };
}
