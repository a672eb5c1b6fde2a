//! GPIO input line
//!
//! [`InputLine`] is the only place the daemon touches hardware. The production
//! implementation wraps an `rppal` input pin; tests substitute scripted lines.

use rppal::gpio::{Gpio, InputPin, Level};
use tracing::{error, info};

use crate::config::PullMode;

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("Failed to configure BCM pin {pin}: {source}")]
    Configure {
        pin: u8,
        source: rppal::gpio::Error,
    },

    // rppal reads are infallible; other line backends report through this
    #[error("Failed to read BCM pin {pin}: {message}")]
    Read { pin: u8, message: String },
}

/// A digital input that can be sampled
pub trait InputLine: Send {
    /// Current electrical level, `true` for high
    fn read_level(&mut self) -> Result<bool, GpioError>;

    /// BCM pin number, for diagnostics
    fn pin(&self) -> u8;
}

/// Input line backed by the Raspberry Pi GPIO peripheral
#[derive(Debug)]
pub struct RppalInput {
    pin: InputPin,
}

impl RppalInput {
    /// Acquire `pin` as an input with the requested pull resistor.
    ///
    /// The pin is released and reset when the returned value is dropped.
    pub fn configure_input(pin: u8, pull: PullMode) -> Result<Self, GpioError> {
        info!("Configuring BCM pin {} as input (pull {:?})", pin, pull);

        let gpio = Gpio::new().map_err(|source| {
            error!("Failed to open GPIO peripheral: {}", source);
            GpioError::Configure { pin, source }
        })?;
        let raw = gpio
            .get(pin)
            .map_err(|source| GpioError::Configure { pin, source })?;

        let input = match pull {
            PullMode::Up => raw.into_input_pullup(),
            PullMode::Down => raw.into_input_pulldown(),
            PullMode::Off => raw.into_input(),
        };

        Ok(Self { pin: input })
    }
}

impl InputLine for RppalInput {
    fn read_level(&mut self) -> Result<bool, GpioError> {
        Ok(self.pin.read() == Level::High)
    }

    fn pin(&self) -> u8 {
        self.pin.pin()
    }
}
