//! GPIO lines and pin interrupts through the ESP-IDF GPIO driver.

use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use esp_idf_hal::sys;

use super::check;
use crate::irq::IrqHub;
use crate::traits::{Edge, GpioHal, HalError, PinId, Pull};

const TAG: &str = "[GPIO]";

/// Upper bound on GPIO numbers across ESP32 variants.
const GPIO_COUNT: usize = 64;

type Router = AtomicPtr<IrqHub<Esp32Gpio>>;

#[allow(clippy::declare_interior_mutable_const)]
const NO_ROUTE: Router = AtomicPtr::new(ptr::null_mut());

/// Hub that receives edges of each pin. Indexed by GPIO number.
static ROUTES: [Router; GPIO_COUNT] = [NO_ROUTE; GPIO_COUNT];

/// Shared ISR service handler. `arg` carries the GPIO number.
unsafe extern "C" fn on_edge(arg: *mut c_void) {
    let pin = arg as usize;
    if let Some(route) = ROUTES.get(pin) {
        // Safe: routes only ever hold `&'static` hubs or null.
        if let Some(hub) = unsafe { route.load(Ordering::Acquire).as_ref() } {
            hub.handle_edge(pin as PinId);
        }
    }
}

/// ESP-IDF GPIO driver.
///
/// The shared GPIO ISR service is installed lazily by the first
/// `install_isr` that finds it missing.
///
/// # Example
///
/// ```ignore
/// use irq_io::hal::esp32::Esp32Gpio;
/// use irq_io::{Decoder, EncoderConfig, IrqHub, StdDelay};
///
/// let hub = IrqHub::leak(Esp32Gpio::new());
/// let decoder = Decoder::new(hub, &EncoderConfig::new(6, 7), StdDelay)?;
/// ```
#[derive(Debug, Default)]
pub struct Esp32Gpio {
    isr_service_flags: i32,
}

impl Esp32Gpio {
    /// Creates the driver; the ISR service uses default allocation flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interrupt allocation flags of the shared ISR service.
    pub fn with_isr_service_flags(mut self, flags: i32) -> Self {
        self.isr_service_flags = flags;
        self
    }

    fn configure(pin: PinId, pull: Pull, intr: sys::gpio_int_type_t) -> Result<(), HalError> {
        if pin as usize >= GPIO_COUNT {
            return Err(HalError::new(sys::ESP_ERR_INVALID_ARG as sys::esp_err_t));
        }
        let config = sys::gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: sys::gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: if pull.pull_up() {
                sys::gpio_pullup_t_GPIO_PULLUP_ENABLE
            } else {
                sys::gpio_pullup_t_GPIO_PULLUP_DISABLE
            },
            pull_down_en: if pull.pull_down() {
                sys::gpio_pulldown_t_GPIO_PULLDOWN_ENABLE
            } else {
                sys::gpio_pulldown_t_GPIO_PULLDOWN_DISABLE
            },
            intr_type: intr,
            ..Default::default()
        };
        check(unsafe { sys::gpio_config(&config) })
    }

    fn add_handler(pin: PinId) -> sys::esp_err_t {
        unsafe { sys::gpio_isr_handler_add(pin as i32, Some(on_edge), pin as usize as *mut c_void) }
    }
}

fn intr_type(edge: Edge) -> sys::gpio_int_type_t {
    match edge {
        Edge::Rising => sys::gpio_int_type_t_GPIO_INTR_POSEDGE,
        Edge::Falling => sys::gpio_int_type_t_GPIO_INTR_NEGEDGE,
        Edge::Any => sys::gpio_int_type_t_GPIO_INTR_ANYEDGE,
        Edge::LowLevel => sys::gpio_int_type_t_GPIO_INTR_LOW_LEVEL,
        Edge::HighLevel => sys::gpio_int_type_t_GPIO_INTR_HIGH_LEVEL,
    }
}

impl GpioHal for Esp32Gpio {
    fn configure_input(&self, pin: PinId, pull: Pull) -> Result<(), HalError> {
        Self::configure(pin, pull, sys::gpio_int_type_t_GPIO_INTR_DISABLE)
    }

    fn configure_interrupt(&self, pin: PinId, pull: Pull, edge: Edge) -> Result<(), HalError> {
        Self::configure(pin, pull, intr_type(edge))?;
        check(unsafe { sys::gpio_intr_disable(pin as i32) })
    }

    fn is_high(&self, pin: PinId) -> bool {
        unsafe { sys::gpio_get_level(pin as i32) != 0 }
    }

    fn install_isr(&self, pin: PinId, router: &'static IrqHub<Self>) -> Result<(), HalError> {
        let route = ROUTES
            .get(pin as usize)
            .ok_or(HalError::new(sys::ESP_ERR_INVALID_ARG as sys::esp_err_t))?;
        route.store(ptr::from_ref(router).cast_mut(), Ordering::Release);

        let mut ret = Self::add_handler(pin);
        if ret == sys::ESP_ERR_INVALID_STATE as sys::esp_err_t {
            // ISR service not installed yet
            let service = unsafe { sys::gpio_install_isr_service(self.isr_service_flags) };
            if service != sys::ESP_OK as sys::esp_err_t {
                diag_error!(TAG, "ISR service install failed: {}", service);
            }
            ret = Self::add_handler(pin);
        }

        check(ret).inspect_err(|_| route.store(ptr::null_mut(), Ordering::Release))
    }

    fn remove_isr(&self, pin: PinId) {
        unsafe {
            sys::gpio_isr_handler_remove(pin as i32);
        }
        if let Some(route) = ROUTES.get(pin as usize) {
            route.store(ptr::null_mut(), Ordering::Release);
        }
    }

    fn enable_interrupt(&self, pin: PinId) {
        unsafe {
            sys::gpio_intr_enable(pin as i32);
        }
    }

    fn disable_interrupt(&self, pin: PinId) {
        unsafe {
            sys::gpio_intr_disable(pin as i32);
        }
    }

    fn reset_pin(&self, pin: PinId) {
        unsafe {
            sys::gpio_reset_pin(pin as i32);
        }
    }
}
