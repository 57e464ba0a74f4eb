//! Measurement sessions: start/stop of the per-device telemetry collectors.
//!
//! A session runs with the device's USB power cut, so the hardware sampler
//! sees only the device's own draw; Android software telemetry rides on
//! adb-over-wifi for the duration.

use std::path::Path;
use std::thread;

use crate::bridge::AdbBridge;
use crate::core::collectors;
use crate::core::device::{Device, OsClass, PowerState};
use crate::core::recharge::{self, RechargeThreshold};
use crate::core::sampler::{OutputFormat, MAX_GRANULARITY};
use crate::core::supervisor::ProcessSupervisor;
use crate::error::{Result, RigError};
use crate::hw::{HubPort, PortState, RailSwitch};

/// Sampling interval of the software (ADB) sampler.
const ADB_SAMPLER_INTERVAL_SECS: u64 = 3;

/// Options for a measurement session.
#[derive(Debug, Clone)]
pub struct MeasureOptions {
    pub format: OutputFormat,
    pub granularity: usize,
    /// Battery ratio to top up to before the run starts.
    pub recharge_target: Option<f64>,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            granularity: 1,
            recharge_target: None,
        }
    }
}

impl MeasureOptions {
    /// Validate before any actuation. Bad options must fail here, not
    /// inside a detached collector whose output nobody sees.
    fn validate(&self) -> Result<Option<RechargeThreshold>> {
        if !(1..=MAX_GRANULARITY).contains(&self.granularity) {
            return Err(RigError::InvalidGranularity(self.granularity));
        }
        self.recharge_target.map(RechargeThreshold::up_to).transpose()
    }
}

/// Start the collectors for a measurement run into `output_dir`.
pub fn start_measuring(
    device: &Device,
    rail: &mut dyn RailSwitch,
    hub: &mut dyn HubPort,
    supervisor: &ProcessSupervisor,
    output_dir: &Path,
    options: &MeasureOptions,
) -> Result<()> {
    let recharge_threshold = options.validate()?;

    std::fs::create_dir_all(output_dir)?;

    if rail.read_state(&device.channel)? == PowerState::Off {
        return Err(RigError::bridge(format!("device '{}' is off", device.name)));
    }
    if !hub.is_device_available()? {
        return Err(RigError::DeviceUnavailable(device.name.clone()));
    }

    if device.os == OsClass::Android {
        let bridge = AdbBridge::new(device)?;
        if let Some(threshold) = recharge_threshold {
            use crate::bridge::DeviceBridge;
            if bridge.battery_ratio()? < threshold.min() {
                recharge::await_battery_level(&bridge, threshold.max())?;
            }
        }

        // software telemetry must survive the USB power-down below
        let ip = device
            .ip
            .as_deref()
            .ok_or_else(|| RigError::bridge(format!("device '{}' has no ip configured", device.name)))?;
        bridge.enable_wifi_adb(ip)?;
        thread::sleep(collectors::SPAWN_SETTLE_SHORT);

        let wifi = AdbBridge::over_wifi(device)?;
        match wifi.traffic() {
            Ok((rx, tx)) => {
                log::info!("Device traffic counters at session start: rx {rx} B, tx {tx} B.")
            }
            Err(e) => log::warn!("Could not read traffic counters: {e}"),
        }
        collectors::start_adb_sampler(
            supervisor,
            wifi.serial(),
            ADB_SAMPLER_INTERVAL_SECS,
            &output_dir.join("measurements_adb.csv"),
        )?;
        thread::sleep(collectors::SPAWN_SETTLE_SHORT);
    }

    // cut USB power so the rail sees only the device's own draw
    hub.set_state(PortState::Disabled)?;
    thread::sleep(collectors::SPAWN_SETTLE_SHORT);

    let output = output_dir.join(format!(
        "measurements_monsoon.{}",
        options.format.extension()
    ));
    collectors::start_supply_sampler(supervisor, &output, options.format, options.granularity)?;
    thread::sleep(collectors::SPAWN_SETTLE_LONG);

    Ok(())
}

/// Stop the collectors and restore the device's USB state.
pub fn stop_measuring(
    device: &Device,
    rail: &mut dyn RailSwitch,
    hub: &mut dyn HubPort,
    supervisor: &ProcessSupervisor,
) -> Result<()> {
    if rail.read_state(&device.channel)? == PowerState::Off {
        return Err(RigError::bridge(format!("device '{}' is off", device.name)));
    }

    collectors::stop_supply_sampler(supervisor)?;

    hub.set_state(PortState::Enabled)?;
    thread::sleep(collectors::SPAWN_SETTLE_SHORT);

    if device.os == OsClass::Android {
        if let Ok(wifi) = AdbBridge::over_wifi(device) {
            match wifi.traffic() {
                Ok((rx, tx)) => {
                    log::info!("Device traffic counters at session end: rx {rx} B, tx {tx} B.")
                }
                Err(e) => log::warn!("Could not read traffic counters: {e}"),
            }
        }

        collectors::stop_adb_sampler(supervisor)?;
        thread::sleep(collectors::SPAWN_SETTLE_SHORT);

        if let Some(ip) = device.ip.as_deref() {
            AdbBridge::new(device)?.disable_wifi_adb(ip)?;
            thread::sleep(collectors::SPAWN_SETTLE_SHORT);
        }
    }

    Ok(())
}
