//! Hardware timer abstraction.
//!
//! Timers are addressed by [`TimerUnit`]: two groups of two general-purpose
//! counters, as on the ESP32. Each unit is a 64-bit up-counter with an alarm
//! that auto-reloads and raises an interrupt.

#[cfg(feature = "std")]
use crate::timer::TimerBank;
#[cfg(feature = "std")]
use crate::traits::HalError;

/// One general-purpose hardware timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimerUnit {
    /// Timer 0 of group 0.
    Group0Timer0 = 0,
    /// Timer 1 of group 0.
    Group0Timer1 = 1,
    /// Timer 0 of group 1.
    Group1Timer0 = 2,
    /// Timer 1 of group 1.
    Group1Timer1 = 3,
}

impl TimerUnit {
    /// Number of timer units.
    pub const COUNT: usize = 4;

    /// All units in index order.
    pub const ALL: [TimerUnit; Self::COUNT] = [
        TimerUnit::Group0Timer0,
        TimerUnit::Group0Timer1,
        TimerUnit::Group1Timer0,
        TimerUnit::Group1Timer1,
    ];

    /// Returns the registry index of this unit.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the unit for a registry index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(TimerUnit::Group0Timer0),
            1 => Some(TimerUnit::Group0Timer1),
            2 => Some(TimerUnit::Group1Timer0),
            3 => Some(TimerUnit::Group1Timer1),
            _ => None,
        }
    }

    /// Returns the timer group (0 or 1).
    ///
    /// # Examples
    ///
    /// ```
    /// use irq_io::TimerUnit;
    ///
    /// assert_eq!(TimerUnit::Group1Timer0.group(), 1);
    /// assert_eq!(TimerUnit::Group1Timer0.timer(), 0);
    /// ```
    #[inline]
    pub const fn group(self) -> u32 {
        (self as u32) >> 1
    }

    /// Returns the timer index inside its group (0 or 1).
    #[inline]
    pub const fn timer(self) -> u32 {
        (self as u32) & 1
    }
}

/// Hardware timer driver.
///
/// # Implementation Notes
///
/// - `init` leaves the counter paused at zero, counting up, with the alarm
///   enabled at `alarm_ticks` and auto-reload on
/// - `counter`, `set_counter` and `set_alarm` may be called from the alarm
///   interrupt and must not block
/// - `install_isr` routes alarm interrupts of `unit` to
///   [`TimerBank::handle_alarm`]
#[cfg(feature = "std")]
pub trait TimerHal: Send + Sync + Sized + 'static {
    /// Initializes `unit` with the given clock divider and alarm value.
    fn init(&self, unit: TimerUnit, divider: u32, alarm_ticks: u64) -> Result<(), HalError>;

    /// Releases `unit`.
    fn deinit(&self, unit: TimerUnit);

    /// Starts counting.
    fn start(&self, unit: TimerUnit);

    /// Pauses counting.
    fn pause(&self, unit: TimerUnit);

    /// Returns the current counter value in ticks.
    fn counter(&self, unit: TimerUnit) -> u64;

    /// Overwrites the counter value.
    fn set_counter(&self, unit: TimerUnit, ticks: u64);

    /// Moves the alarm to `ticks`.
    fn set_alarm(&self, unit: TimerUnit, ticks: u64);

    /// Installs the alarm handler for `unit`, forwarding to `router`.
    fn install_isr(
        &self,
        unit: TimerUnit,
        router: &'static TimerBank<Self>,
        intr_flags: i32,
    ) -> Result<(), HalError>;

    /// Removes the alarm handler of `unit`.
    fn remove_isr(&self, unit: TimerUnit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_group_and_timer_indices() {
        assert_eq!((TimerUnit::Group0Timer0.group(), TimerUnit::Group0Timer0.timer()), (0, 0));
        assert_eq!((TimerUnit::Group0Timer1.group(), TimerUnit::Group0Timer1.timer()), (0, 1));
        assert_eq!((TimerUnit::Group1Timer0.group(), TimerUnit::Group1Timer0.timer()), (1, 0));
        assert_eq!((TimerUnit::Group1Timer1.group(), TimerUnit::Group1Timer1.timer()), (1, 1));
    }

    #[test]
    fn unit_index_roundtrip() {
        for unit in TimerUnit::ALL {
            assert_eq!(TimerUnit::from_index(unit.index()), Some(unit));
        }
        assert_eq!(TimerUnit::from_index(4), None);
    }
}
