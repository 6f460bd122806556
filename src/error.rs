//! Error types for component construction and driver initialization.
//!
//! Only construction and initialization can fail. Once a decoder, interrupt
//! source or channel is up, transient hardware conditions are recovered
//! locally and never surface here.

use core::fmt;

use crate::traits::{HalError, PinId};

/// Fatal errors raised while claiming and configuring hardware.
///
/// A component whose constructor returned one of these was never created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The pin does not exist or cannot be put into the requested mode.
    InvalidPin {
        /// Pin that was rejected.
        pin: PinId,
        /// Underlying HAL error.
        source: HalError,
    },
    /// The pin is already claimed by another interrupt source.
    PinBusy(PinId),
    /// Installing the interrupt handler for the pin failed.
    IsrInstall {
        /// Pin whose handler could not be installed.
        pin: PinId,
        /// Underlying HAL error.
        source: HalError,
    },
    /// Every slot of a fixed-capacity arena is in use.
    NoFreeSlot,
    /// The background worker thread could not be started.
    WorkerSpawn,
    /// The interrupt-to-worker signal could not be allocated.
    SignalUnavailable,
    /// Any other HAL failure.
    Hal(HalError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPin { pin, source } => {
                write!(f, "pin {} cannot be configured: {}", pin, source)
            }
            ConfigError::PinBusy(pin) => write!(f, "pin {} is already claimed", pin),
            ConfigError::IsrInstall { pin, source } => {
                write!(f, "interrupt handler for pin {} not installed: {}", pin, source)
            }
            ConfigError::NoFreeSlot => write!(f, "no free slot left"),
            ConfigError::WorkerSpawn => write!(f, "worker thread could not be started"),
            ConfigError::SignalUnavailable => write!(f, "interrupt signal could not be allocated"),
            ConfigError::Hal(e) => write!(f, "{}", e),
        }
    }
}

impl From<HalError> for ConfigError {
    fn from(error: HalError) -> Self {
        ConfigError::Hal(error)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Errors raised while bringing up a serial channel.
///
/// Each variant names the step of the peripheral bring-up that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverError {
    /// Programming baud rate and line format failed.
    ParamConfig(HalError),
    /// Routing TX/RX/RTS/CTS pins failed.
    SetPin(HalError),
    /// Configuring hardware or software flow control failed.
    FlowControl(HalError),
    /// Installing the driver and its event queue failed.
    Install(HalError),
    /// Configuring the receive interrupt thresholds failed.
    InterruptConfig(HalError),
    /// The event worker thread could not be started.
    WorkerSpawn,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::ParamConfig(e) => write!(f, "parameter config failed: {}", e),
            DriverError::SetPin(e) => write!(f, "pin routing failed: {}", e),
            DriverError::FlowControl(e) => write!(f, "flow control setup failed: {}", e),
            DriverError::Install(e) => write!(f, "driver install failed: {}", e),
            DriverError::InterruptConfig(e) => write!(f, "interrupt config failed: {}", e),
            DriverError::WorkerSpawn => write!(f, "event worker could not be started"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DriverError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidPin {
            pin: 99,
            source: HalError::new(0x102),
        };
        assert_eq!(err.to_string(), "pin 99 cannot be configured: HAL error 0x102");
        assert_eq!(ConfigError::PinBusy(4).to_string(), "pin 4 is already claimed");
        assert_eq!(
            ConfigError::SignalUnavailable.to_string(),
            "interrupt signal could not be allocated"
        );
    }

    #[test]
    fn hal_error_converts_into_config_error() {
        let err: ConfigError = HalError::new(-1).into();
        assert_eq!(err, ConfigError::Hal(HalError::new(-1)));
    }

    #[test]
    fn driver_error_names_the_failed_step() {
        let err = DriverError::Install(HalError::new(0x103));
        assert_eq!(err.to_string(), "driver install failed: HAL error 0x103");
    }

    #[test]
    fn errors_work_with_anyhow() {
        let result: anyhow::Result<()> = Err(DriverError::WorkerSpawn.into());
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "event worker could not be started");
    }
}
