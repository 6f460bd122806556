//! ESP32 encoder + serial bridge firmware.
//!
//! Brings up the three interrupt-driven building blocks on real hardware:
//! - Rotary encoder on GPIO6/7, decoded from the falling edge of E2
//! - UART1 on GPIO21/20, echoing every received payload back
//! - Timer group 0 unit 0 as a 1 ms heartbeat
//!
//! Each encoder turn is reported over the serial channel.
//!
//! # Build
//!
//! ```bash
//! cargo build --release --features esp32 --bin esp32_main
//! espflash flash --monitor target/riscv32imc-esp-espidf/release/esp32_main
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use irq_io::hal::esp32::{pins, Esp32Gpio, Esp32Timer, Esp32Uart};
use irq_io::{
    Config, Decoder, DecoderState, EncoderConfig, IrqHub, IrqToken, StdDelay, TimerBank,
    TimerReaction, TimerUnit, TxOutcome, UartChannel, UartConfig,
};

/// Main loop interval in milliseconds.
const LOOP_INTERVAL_MS: u64 = 10;

/// Heartbeat ticks between status lines (1 s at 1 kHz).
const STATUS_EVERY: u32 = 1000;

static HEARTBEAT: AtomicU32 = AtomicU32::new(0);

fn on_heartbeat(_bank: &TimerBank<Esp32Timer>, _unit: TimerUnit, _token: IrqToken) {
    HEARTBEAT.fetch_add(1, Ordering::Relaxed);
}

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_hal::sys::link_patches();

    println!();
    println!("================================");
    println!("  irq-io Encoder / UART Bridge");
    println!("================================");
    println!();

    // =========================================================================
    // Configuration
    // =========================================================================
    let config = Config::default()
        .with_encoder(EncoderConfig::new(pins::ENC_E1, pins::ENC_E2))
        .with_uart(UartConfig::default().with_pins(pins::UART_TX, pins::UART_RX));

    // =========================================================================
    // Initialize Encoder (E1 level on GPIO6, E2 edge on GPIO7)
    // =========================================================================
    let hub = IrqHub::leak(Esp32Gpio::new());
    let decoder = Decoder::new(hub, &config.encoder, StdDelay)?;
    println!(
        "[OK] Encoder initialized (GPIO{}/{}, {} ms debounce)",
        pins::ENC_E1,
        pins::ENC_E2,
        config.encoder.debounce_ms
    );

    // =========================================================================
    // Initialize Serial Channel (UART1 on GPIO21/20)
    // =========================================================================
    let (rx_tx, rx_rx) = mpsc::channel::<Vec<u8>>();
    let mut channel = UartChannel::new(Esp32Uart::new(), config.uart.clone());
    channel.initialize_with(move |payload: &[u8]| {
        let _ = rx_tx.send(payload.to_vec());
    })?;
    println!(
        "[OK] UART{} initialized ({} baud)",
        config.uart.port, config.uart.baud_rate
    );

    // =========================================================================
    // Initialize Heartbeat Timer
    // =========================================================================
    let timers = TimerBank::leak(Esp32Timer::new());
    let heartbeat = timers.timer_with_flags(config.timer.unit, config.timer.interrupt_alloc_flags);
    heartbeat.initialize(config.timer.period_us)?;
    heartbeat.set_reaction(TimerReaction::new(on_heartbeat, IrqToken::new(0)));
    heartbeat.start();
    println!("[OK] Heartbeat timer started ({} us)", config.timer.period_us);

    println!();
    println!("Running...");

    // =========================================================================
    // Main Loop
    // =========================================================================
    let mut last_status = 0u32;
    loop {
        match decoder.state() {
            DecoderState::Idle => {}
            turned => {
                let line: &[u8] = match turned {
                    DecoderState::TurnedLeft => b"encoder: left\r\n",
                    _ => b"encoder: right\r\n",
                };
                if let TxOutcome::Partial { sent, requested } = channel.tx(line) {
                    println!("[WARN] encoder report truncated ({sent}/{requested})");
                }
                decoder.reset_state();
            }
        }

        while let Ok(payload) = rx_rx.try_recv() {
            let _ = channel.tx(&payload);
        }

        let beats = HEARTBEAT.load(Ordering::Relaxed);
        if beats.wrapping_sub(last_status) >= STATUS_EVERY {
            last_status = beats;
            let stats = channel.stats();
            println!(
                "[STATUS] beats={} rx_bytes={} resyncs={} edges={}",
                beats,
                stats.bytes_received,
                stats.resyncs,
                decoder.edge_stats().map_or(0, |s| s.delivered)
            );
        }

        thread::sleep(Duration::from_millis(LOOP_INTERVAL_MS));
    }
}
