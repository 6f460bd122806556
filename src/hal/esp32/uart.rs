//! UART driver and event queue through the ESP-IDF UART driver.

use core::ffi::c_void;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicI32, Ordering};

use esp_idf_hal::sys;

use super::check;
use crate::config::UartConfig;
use crate::error::DriverError;
use crate::traits::{DataBits, Event, EventQueue, FlowControl, Parity, StopBits, UartDriver};

const TAG: &str = "[UART]";

const NOT_INSTALLED: i32 = -1;
const PIN_NO_CHANGE: i32 = -1;
const FIFO_LEN: u8 = 128;
const MAX_DELAY: sys::TickType_t = sys::TickType_t::MAX;

// UART_INT_ENA bits
const RXFIFO_FULL: u32 = 1 << 0;
const PARITY_ERR: u32 = 1 << 2;
const FRM_ERR: u32 = 1 << 3;
const RXFIFO_OVF: u32 = 1 << 4;
const BRK_DET: u32 = 1 << 7;
const RXFIFO_TOUT: u32 = 1 << 8;

const RX_INTR_MASK: u32 = RXFIFO_FULL | RXFIFO_TOUT | FRM_ERR | RXFIFO_OVF | BRK_DET | PARITY_ERR;

/// ESP-IDF UART driver for one port.
///
/// The port number comes from the [`UartConfig`] passed to `install`.
#[derive(Debug)]
pub struct Esp32Uart {
    port: AtomicI32,
}

impl Esp32Uart {
    /// Creates an uninstalled driver.
    pub const fn new() -> Self {
        Self {
            port: AtomicI32::new(NOT_INSTALLED),
        }
    }

    fn installed_port(&self) -> Option<sys::uart_port_t> {
        let port = self.port.load(Ordering::Acquire);
        (port != NOT_INSTALLED).then_some(port as sys::uart_port_t)
    }
}

impl Default for Esp32Uart {
    fn default() -> Self {
        Self::new()
    }
}

fn word_length(bits: DataBits) -> sys::uart_word_length_t {
    match bits {
        DataBits::Five => sys::uart_word_length_t_UART_DATA_5_BITS,
        DataBits::Six => sys::uart_word_length_t_UART_DATA_6_BITS,
        DataBits::Seven => sys::uart_word_length_t_UART_DATA_7_BITS,
        DataBits::Eight => sys::uart_word_length_t_UART_DATA_8_BITS,
    }
}

fn parity(parity: Parity) -> sys::uart_parity_t {
    match parity {
        Parity::None => sys::uart_parity_t_UART_PARITY_DISABLE,
        Parity::Even => sys::uart_parity_t_UART_PARITY_EVEN,
        Parity::Odd => sys::uart_parity_t_UART_PARITY_ODD,
    }
}

fn stop_bits(bits: StopBits) -> sys::uart_stop_bits_t {
    match bits {
        StopBits::One => sys::uart_stop_bits_t_UART_STOP_BITS_1,
        StopBits::OneAndHalf => sys::uart_stop_bits_t_UART_STOP_BITS_1_5,
        StopBits::Two => sys::uart_stop_bits_t_UART_STOP_BITS_2,
    }
}

fn hw_flow(flow: FlowControl) -> sys::uart_hw_flowcontrol_t {
    match flow {
        FlowControl::Disabled => sys::uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
        FlowControl::Rts => sys::uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_RTS,
        FlowControl::Cts => sys::uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_CTS,
        FlowControl::RtsCts => sys::uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_CTS_RTS,
    }
}

fn pin_or_keep(pin: Option<u32>) -> i32 {
    pin.map_or(PIN_NO_CHANGE, |p| p as i32)
}

impl UartDriver for Esp32Uart {
    type Queue = Esp32EventQueue;

    fn install(&self, config: &UartConfig) -> Result<Esp32EventQueue, DriverError> {
        let port = sys::uart_port_t::from(config.port);

        let params = sys::uart_config_t {
            baud_rate: config.baud_rate as i32,
            data_bits: word_length(config.data_bits),
            parity: parity(config.parity),
            stop_bits: stop_bits(config.stop_bits),
            flow_ctrl: hw_flow(config.flow_control),
            rx_flow_ctrl_thresh: FIFO_LEN - 8,
            ..Default::default()
        };
        check(unsafe { sys::uart_param_config(port, &params) }).map_err(DriverError::ParamConfig)?;

        check(unsafe {
            sys::uart_set_pin(
                port,
                pin_or_keep(config.tx_pin),
                pin_or_keep(config.rx_pin),
                pin_or_keep(config.rts_pin),
                pin_or_keep(config.cts_pin),
            )
        })
        .map_err(DriverError::SetPin)?;

        let flow = if config.sw_flow_control {
            unsafe { sys::uart_set_sw_flow_ctrl(port, true, 8, FIFO_LEN - 8) }
        } else {
            unsafe { sys::uart_set_hw_flow_ctrl(port, hw_flow(config.flow_control), FIFO_LEN - 8) }
        };
        check(flow).map_err(DriverError::FlowControl)?;

        let mut handle: sys::QueueHandle_t = core::ptr::null_mut();
        check(unsafe {
            sys::uart_driver_install(
                port,
                config.rx_buffer_size as i32,
                config.tx_buffer_size as i32,
                config.event_queue_size as i32,
                &mut handle,
                config.interrupt_alloc_flags,
            )
        })
        .map_err(DriverError::Install)?;

        let intr = sys::uart_intr_config_t {
            intr_enable_mask: RX_INTR_MASK,
            rx_timeout_thresh: config.rx_interrupt.rx_timeout_threshold,
            txfifo_empty_intr_thresh: config.rx_interrupt.tx_fifo_empty_threshold,
            rxfifo_full_thresh: config.rx_interrupt.rx_fifo_full_threshold,
        };
        if let Err(e) = check(unsafe { sys::uart_intr_config(port, &intr) }) {
            unsafe { sys::uart_driver_delete(port) };
            return Err(DriverError::InterruptConfig(e));
        }

        self.port.store(port as i32, Ordering::Release);
        diag_info!(TAG, "port {} installed at {} baud", config.port, config.baud_rate);
        Ok(Esp32EventQueue { handle })
    }

    fn uninstall(&self) {
        let port = self.port.swap(NOT_INSTALLED, Ordering::AcqRel);
        if port != NOT_INSTALLED {
            unsafe { sys::uart_driver_delete(port as sys::uart_port_t) };
        }
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        let Some(port) = self.installed_port() else {
            return 0;
        };
        let n = unsafe {
            sys::uart_read_bytes(port, buf.as_mut_ptr().cast::<c_void>(), buf.len() as u32, 0)
        };
        usize::try_from(n).unwrap_or(0)
    }

    fn write(&self, data: &[u8]) -> usize {
        let Some(port) = self.installed_port() else {
            return 0;
        };
        let n = unsafe { sys::uart_write_bytes(port, data.as_ptr().cast::<c_void>(), data.len()) };
        usize::try_from(n).unwrap_or(0)
    }

    fn flush_input(&self) {
        if let Some(port) = self.installed_port() {
            unsafe { sys::uart_flush_input(port) };
        }
    }
}

/// The driver's FreeRTOS event queue.
///
/// The handle is owned by the driver and freed by `uart_driver_delete`.
pub struct Esp32EventQueue {
    handle: sys::QueueHandle_t,
}

// FreeRTOS queues are safe to use from any task.
unsafe impl Send for Esp32EventQueue {}
unsafe impl Sync for Esp32EventQueue {}

#[allow(non_upper_case_globals)]
fn classify(raw: &sys::uart_event_t) -> Event {
    match raw.type_ {
        sys::uart_event_type_t_UART_DATA => Event::DataReady(raw.size),
        sys::uart_event_type_t_UART_FIFO_OVF => Event::FifoOverflow,
        sys::uart_event_type_t_UART_BUFFER_FULL => Event::BufferFull,
        sys::uart_event_type_t_UART_BREAK => Event::Break,
        sys::uart_event_type_t_UART_PARITY_ERR => Event::ParityError,
        sys::uart_event_type_t_UART_FRAME_ERR => Event::FrameError,
        sys::uart_event_type_t_UART_EVENT_MAX => Event::Shutdown,
        other => Event::Other(other as u32),
    }
}

impl EventQueue for Esp32EventQueue {
    fn recv(&self) -> Event {
        let mut raw = MaybeUninit::<sys::uart_event_t>::uninit();
        loop {
            let got = unsafe { sys::xQueueReceive(self.handle, raw.as_mut_ptr().cast(), MAX_DELAY) };
            if got != 0 {
                // Filled by the queue copy above
                return classify(unsafe { raw.assume_init_ref() });
            }
        }
    }

    fn try_recv(&self) -> Option<Event> {
        let mut raw = MaybeUninit::<sys::uart_event_t>::uninit();
        let got = unsafe { sys::xQueueReceive(self.handle, raw.as_mut_ptr().cast(), 0) };
        // Filled by the queue copy when `got` is set
        (got != 0).then(|| classify(unsafe { raw.assume_init_ref() }))
    }

    fn send(&self, event: Event) {
        let type_ = match event {
            Event::Shutdown => sys::uart_event_type_t_UART_EVENT_MAX,
            Event::DataReady(_) => sys::uart_event_type_t_UART_DATA,
            Event::FifoOverflow => sys::uart_event_type_t_UART_FIFO_OVF,
            Event::BufferFull => sys::uart_event_type_t_UART_BUFFER_FULL,
            Event::Break => sys::uart_event_type_t_UART_BREAK,
            Event::ParityError => sys::uart_event_type_t_UART_PARITY_ERR,
            Event::FrameError => sys::uart_event_type_t_UART_FRAME_ERR,
            Event::Other(code) => code as sys::uart_event_type_t,
        };
        let size = match event {
            Event::DataReady(len) => len,
            _ => 0,
        };
        let raw = sys::uart_event_t {
            type_,
            size,
            ..Default::default()
        };
        unsafe {
            sys::xQueueGenericSend(
                self.handle,
                (&raw as *const sys::uart_event_t).cast(),
                MAX_DELAY,
                0,
            );
        }
    }
}
