//! The GPIO multiplexer that routes the shared rail across device channels.
//!
//! The mux board is active-low: driving a line to 0 connects its channel,
//! 1 disconnects it. That encoding is isolated here; everything above deals
//! in [`PowerState`].

use crate::core::device::{PowerChannel, PowerState};
use crate::error::{Result, RigError};
use crate::hw::{gpio, RailSwitch};

const LEVEL_ON: u8 = 0;
const LEVEL_OFF: u8 = 1;

/// Multiplexer over the full set of configured channels.
pub struct RailMux {
    channels: Vec<PowerChannel>,
}

impl RailMux {
    pub fn new(channels: Vec<PowerChannel>) -> Self {
        Self { channels }
    }

    /// Initialize every mux line to output/off. Required once per host boot.
    pub fn init_state(&self) -> Result<()> {
        for channel in &self.channels {
            gpio::init(channel.gpio_pin, LEVEL_OFF)?;
        }
        Ok(())
    }

    fn level_to_state(level: u8) -> Result<PowerState> {
        match level {
            LEVEL_ON => Ok(PowerState::On),
            LEVEL_OFF => Ok(PowerState::Off),
            other => Err(RigError::config(format!("unknown GPIO level: {other}"))),
        }
    }
}

impl RailSwitch for RailMux {
    fn switch_to(&mut self, channel: &PowerChannel) -> Result<()> {
        // all-off first so two channels are never bridged mid-transition
        for other in &self.channels {
            gpio::write(other.gpio_pin, LEVEL_OFF)?;
        }
        gpio::write(channel.gpio_pin, LEVEL_ON)
    }

    fn switch_off(&mut self, channel: &PowerChannel) -> Result<()> {
        gpio::write(channel.gpio_pin, LEVEL_OFF)
    }

    fn read_state(&mut self, channel: &PowerChannel) -> Result<PowerState> {
        Self::level_to_state(gpio::read(channel.gpio_pin)?)
    }

    fn all_channels_off(&mut self) -> Result<bool> {
        for channel in self.channels.clone() {
            if self.read_state(&channel)? == PowerState::On {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
