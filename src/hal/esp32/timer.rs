//! General-purpose timers through the ESP-IDF timer group driver.

use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use esp_idf_hal::sys;

use super::check;
use crate::timer::TimerBank;
use crate::traits::{HalError, TimerHal, TimerUnit};

type Router = AtomicPtr<TimerBank<Esp32Timer>>;

#[allow(clippy::declare_interior_mutable_const)]
const NO_ROUTE: Router = AtomicPtr::new(ptr::null_mut());

/// Bank that receives each unit's alarm. Indexed by unit.
static ROUTES: [Router; TimerUnit::COUNT] = [NO_ROUTE; TimerUnit::COUNT];

/// Alarm callback. `arg` carries the unit index.
unsafe extern "C" fn on_alarm(arg: *mut c_void) -> bool {
    let index = arg as usize;
    let (Some(unit), Some(route)) = (TimerUnit::from_index(index), ROUTES.get(index)) else {
        return false;
    };
    // Routes only ever hold `&'static` banks or null.
    if let Some(bank) = unsafe { route.load(Ordering::Acquire).as_ref() } {
        bank.handle_alarm(unit);
    }
    false
}

fn group(unit: TimerUnit) -> sys::timer_group_t {
    unit.group() as sys::timer_group_t
}

fn idx(unit: TimerUnit) -> sys::timer_idx_t {
    unit.timer() as sys::timer_idx_t
}

/// ESP-IDF timer group driver.
#[derive(Debug, Default)]
pub struct Esp32Timer;

impl Esp32Timer {
    /// Creates the driver.
    pub const fn new() -> Self {
        Self
    }
}

impl TimerHal for Esp32Timer {
    fn init(&self, unit: TimerUnit, divider: u32, alarm_ticks: u64) -> Result<(), HalError> {
        let config = sys::timer_config_t {
            alarm_en: sys::timer_alarm_t_TIMER_ALARM_EN,
            counter_en: sys::timer_start_t_TIMER_PAUSE,
            intr_type: sys::timer_intr_mode_t_TIMER_INTR_LEVEL,
            counter_dir: sys::timer_count_dir_t_TIMER_COUNT_UP,
            auto_reload: sys::timer_autoreload_t_TIMER_AUTORELOAD_EN,
            divider,
            ..Default::default()
        };
        check(unsafe { sys::timer_init(group(unit), idx(unit), &config) })?;
        check(unsafe { sys::timer_set_counter_value(group(unit), idx(unit), 0) })?;
        check(unsafe { sys::timer_set_alarm_value(group(unit), idx(unit), alarm_ticks) })?;
        check(unsafe { sys::timer_enable_intr(group(unit), idx(unit)) })
    }

    fn deinit(&self, unit: TimerUnit) {
        unsafe {
            sys::timer_deinit(group(unit), idx(unit));
        }
    }

    fn start(&self, unit: TimerUnit) {
        unsafe {
            sys::timer_start(group(unit), idx(unit));
        }
    }

    fn pause(&self, unit: TimerUnit) {
        unsafe {
            sys::timer_pause(group(unit), idx(unit));
        }
    }

    fn counter(&self, unit: TimerUnit) -> u64 {
        let mut value = 0u64;
        unsafe {
            sys::timer_get_counter_value(group(unit), idx(unit), &mut value);
        }
        value
    }

    fn set_counter(&self, unit: TimerUnit, ticks: u64) {
        unsafe {
            sys::timer_set_counter_value(group(unit), idx(unit), ticks);
        }
    }

    fn set_alarm(&self, unit: TimerUnit, ticks: u64) {
        unsafe {
            sys::timer_set_alarm_value(group(unit), idx(unit), ticks);
        }
    }

    fn install_isr(
        &self,
        unit: TimerUnit,
        router: &'static TimerBank<Self>,
        intr_flags: i32,
    ) -> Result<(), HalError> {
        let route = &ROUTES[unit.index()];
        route.store(ptr::from_ref(router).cast_mut(), Ordering::Release);
        let ret = unsafe {
            sys::timer_isr_callback_add(
                group(unit),
                idx(unit),
                Some(on_alarm),
                unit.index() as *mut c_void,
                intr_flags,
            )
        };
        check(ret).inspect_err(|_| route.store(ptr::null_mut(), Ordering::Release))
    }

    fn remove_isr(&self, unit: TimerUnit) {
        unsafe {
            sys::timer_isr_callback_remove(group(unit), idx(unit));
        }
        ROUTES[unit.index()].store(ptr::null_mut(), Ordering::Release);
    }
}
