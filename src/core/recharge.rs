//! Auto-recharge control loop.
//!
//! The loop has no upper bound on wait time: a fully depleted battery may
//! take hours. Callers needing a hard ceiling must wrap it externally.

use std::thread;
use std::time::Duration;

use crate::bridge::DeviceBridge;
use crate::error::{Result, RigError};
use crate::hw::{HubPort, PortState};

/// Coarse polling interval while the device charges.
pub const RECHARGE_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Settle after toggling the hub port around a charge.
const HUB_TOGGLE_SETTLE: Duration = Duration::from_secs(5);

/// A `(min, max)` battery-ratio pair, both in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RechargeThreshold {
    min: f64,
    max: f64,
}

impl RechargeThreshold {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&min) {
            return Err(RigError::InvalidRatio(min));
        }
        if !(0.0..=1.0).contains(&max) {
            return Err(RigError::InvalidRatio(max));
        }
        Ok(Self { min, max })
    }

    /// Recharge up to `target`, kicking in as soon as the level dips below it.
    pub fn up_to(target: f64) -> Result<Self> {
        Self::new(target, target)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Block until the device's battery reports at least `target`.
pub fn await_battery_level(bridge: &dyn DeviceBridge, target: f64) -> Result<()> {
    await_battery_level_with(bridge, target, RECHARGE_POLL_INTERVAL)
}

pub(crate) fn await_battery_level_with(
    bridge: &dyn DeviceBridge,
    target: f64,
    poll: Duration,
) -> Result<()> {
    loop {
        let ratio = bridge.battery_ratio()?;
        if ratio >= target {
            log::info!("Device reached battery level {ratio:.2}. Continuing...");
            return Ok(());
        }
        log::info!(
            "Device is charging while at battery level {ratio:.2}. Waiting until it reaches {target:.2}."
        );
        thread::sleep(poll);
    }
}

/// Check the battery and charge if it is below the threshold's minimum.
///
/// Charging re-enables the hub port (USB power delivery), blocks until the
/// maximum ratio is reached, then re-disables the port so the experiment
/// resumes in its expected USB state. Returns whether charging occurred.
pub fn recharge_if_needed(
    bridge: &dyn DeviceBridge,
    hub: &mut dyn HubPort,
    threshold: RechargeThreshold,
) -> Result<bool> {
    recharge_if_needed_with(bridge, hub, threshold, RECHARGE_POLL_INTERVAL)
}

pub(crate) fn recharge_if_needed_with(
    bridge: &dyn DeviceBridge,
    hub: &mut dyn HubPort,
    threshold: RechargeThreshold,
    poll: Duration,
) -> Result<bool> {
    let ratio = bridge.battery_ratio()?;
    log::info!(
        "Device battery level is at {ratio:.2}. (threshold range: {:.2}-{:.2})",
        threshold.min(),
        threshold.max()
    );

    if ratio >= threshold.min() {
        return Ok(false);
    }

    log::info!("Device needs charging. Battery level is at {ratio:.2}.");

    let port_was_disabled = hub.get_state()? == PortState::Disabled;
    if port_was_disabled {
        log::info!("Enabling relevant USB port to allow device charging...");
        hub.set_state(PortState::Enabled)?;
        thread::sleep(HUB_TOGGLE_SETTLE);
    }

    await_battery_level_with(bridge, threshold.max(), poll)?;

    if port_was_disabled {
        hub.set_state(PortState::Disabled)?;
        thread::sleep(HUB_TOGGLE_SETTLE);
    }

    Ok(true)
}
