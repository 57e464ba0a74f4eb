//! Actuator drivers for the bench hardware.
//!
//! Each driver reads and writes one piece of physical state and can itself
//! fail (device absent, communication error). The traits here are the seams
//! the orchestration layer is written against; the concrete implementations
//! talk to the real rail multiplexer, USB hub and power supply.

pub mod gpio;
pub mod railmux;
pub mod supply;
pub mod usbhub;

pub use railmux::RailMux;
pub use supply::{MonsoonHvpm, SampleBlock, Supply, SupplySession};
pub use usbhub::{PortState, YkushPort};

use std::thread;
use std::time::{Duration, Instant};

use crate::core::device::{PowerChannel, PowerState};
use crate::error::Result;

/// Interval between availability probes during bounded waits.
pub const AVAILABILITY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The GPIO multiplexer that routes the shared rail to exactly one channel.
pub trait RailSwitch {
    /// Switch the rail to `channel`, atomically switching every other channel
    /// off first.
    fn switch_to(&mut self, channel: &PowerChannel) -> Result<()>;

    /// Switch a single channel off.
    fn switch_off(&mut self, channel: &PowerChannel) -> Result<()>;

    /// Read the electrical state of a channel back from its GPIO line.
    fn read_state(&mut self, channel: &PowerChannel) -> Result<PowerState>;

    /// True when no configured channel is electrically on.
    fn all_channels_off(&mut self) -> Result<bool>;
}

/// One switchable port on the USB hub.
pub trait HubPort {
    fn set_state(&mut self, state: PortState) -> Result<()>;

    fn get_state(&mut self) -> Result<PortState>;

    /// Whether the attached device currently enumerates on the bus.
    fn is_device_available(&mut self) -> Result<bool>;

    /// Sleep-poll until the device enumerates or `timeout` elapses. Returns
    /// whether the device became available.
    fn wait_for_availability(&mut self, timeout: Duration) -> Result<bool> {
        log::info!("Waiting for device to become available...");
        let start = Instant::now();
        loop {
            if self.is_device_available()? {
                log::info!("Device is now available.");
                return Ok(true);
            }
            if start.elapsed() > timeout {
                log::warn!(
                    "Device failed to become available after waiting for {}s.",
                    timeout.as_secs()
                );
                return Ok(false);
            }
            thread::sleep(AVAILABILITY_POLL_INTERVAL);
        }
    }
}
