//! The power-rail exclusivity state machine.
//!
//! Serializes access to the shared high-voltage rail across all configured
//! channels and sequences device bring-up/bring-down. Bring-up fails fast and
//! aborts on the first error; bring-down is maximally effective, continuing
//! past individual actuator failures and aggregating them into one warning.

use std::thread;
use std::time::Duration;

use crate::bridge::{AdbBridge, IosBridge};
use crate::core::collectors;
use crate::core::device::{Device, OsClass, PowerState};
use crate::core::recharge::{self, RechargeThreshold};
use crate::core::supervisor::ProcessSupervisor;
use crate::error::{Result, RigError};
use crate::hw::{HubPort, PortState, RailSwitch, Supply};

/// Extra settle after raw USB enumeration succeeds. Enumeration precedes
/// OS-level boot readiness; this value is empirically derived on the current
/// rack and must be re-validated on new hardware.
pub const POST_ENUMERATION_SETTLE: Duration = Duration::from_secs(5);

const MUX_SETTLE: Duration = Duration::from_secs(1);
const SUPPLY_DISCONNECT_SETTLE: Duration = Duration::from_secs(1);

/// Timings for the bring-up sequence. Tests shrink these; production uses the
/// defaults.
#[derive(Debug, Clone)]
pub struct PowerTimings {
    /// Bounded wait for supply / device availability.
    pub availability_timeout: Duration,
    pub mux_settle: Duration,
    pub post_enumeration_settle: Duration,
}

impl Default for PowerTimings {
    fn default() -> Self {
        Self {
            availability_timeout: Duration::from_secs(300),
            mux_settle: MUX_SETTLE,
            post_enumeration_settle: POST_ENUMERATION_SETTLE,
        }
    }
}

/// OS-specific bring-up/bring-down capability, resolved once per device.
pub trait PowerSequencer {
    /// Steps after the device enumerates and settles (battery report,
    /// recharge, clock sync, USB trust authorization).
    fn after_power_on(
        &self,
        hub: &mut dyn HubPort,
        recharge: Option<RechargeThreshold>,
    ) -> Result<()>;

    /// Best-effort OS-level shutdown before the rail is de-energized.
    fn shutdown_device(&self) -> Result<()>;
}

/// Android: battery readout over ADB, optional blocking recharge.
pub struct AndroidSequencer {
    bridge: AdbBridge,
}

impl AndroidSequencer {
    pub fn new(device: &Device) -> Result<Self> {
        Ok(Self {
            bridge: AdbBridge::new(device)?,
        })
    }
}

impl PowerSequencer for AndroidSequencer {
    fn after_power_on(
        &self,
        hub: &mut dyn HubPort,
        recharge: Option<RechargeThreshold>,
    ) -> Result<()> {
        use crate::bridge::DeviceBridge;

        let ratio = self.bridge.battery_ratio()?;
        log::info!("Device battery level is at {ratio:.2}.");

        if let Some(threshold) = recharge {
            recharge::recharge_if_needed(&self.bridge, hub, threshold)?;
        }
        Ok(())
    }

    fn shutdown_device(&self) -> Result<()> {
        use crate::bridge::DeviceBridge;
        self.bridge.power_off()
    }
}

/// iOS: host/device clock sync, then the transient unlock sequence that
/// authorizes the USB trust relationship (required once per boot).
pub struct IosSequencer {
    bridge: IosBridge,
    supervisor: ProcessSupervisor,
}

impl IosSequencer {
    pub fn new(device: &Device) -> Result<Self> {
        Ok(Self {
            bridge: IosBridge::new(device)?,
            supervisor: ProcessSupervisor::with_default_store()?,
        })
    }
}

impl PowerSequencer for IosSequencer {
    fn after_power_on(
        &self,
        _hub: &mut dyn HubPort,
        _recharge: Option<RechargeThreshold>,
    ) -> Result<()> {
        log::info!("Syncing device time with host...");
        self.bridge.sync_clock()?;
        thread::sleep(Duration::from_secs(1));
        self.bridge.authorize_usb_trust(&self.supervisor)
    }

    fn shutdown_device(&self) -> Result<()> {
        use crate::bridge::DeviceBridge;
        self.bridge.power_off()
    }
}

/// Resolve the OS-specific sequencer for a device once, at session start.
pub fn sequencer_for(device: &Device) -> Result<Box<dyn PowerSequencer>> {
    match device.os {
        OsClass::Android => Ok(Box::new(AndroidSequencer::new(device)?)),
        OsClass::Ios => Ok(Box::new(IosSequencer::new(device)?)),
    }
}

/// Exclusive arbiter of the shared power rail.
pub struct PowerController {
    rail: Box<dyn RailSwitch>,
    supply: Box<dyn Supply>,
    timings: PowerTimings,
}

impl PowerController {
    pub fn new(rail: Box<dyn RailSwitch>, supply: Box<dyn Supply>) -> Self {
        Self::with_timings(rail, supply, PowerTimings::default())
    }

    pub fn with_timings(
        rail: Box<dyn RailSwitch>,
        supply: Box<dyn Supply>,
        timings: PowerTimings,
    ) -> Self {
        Self {
            rail,
            supply,
            timings,
        }
    }

    /// Read a device's power state back from its GPIO line.
    pub fn read_state(&mut self, device: &Device) -> Result<PowerState> {
        self.rail.read_state(&device.channel)
    }

    /// Bring a device up on the rail.
    ///
    /// Fails with `RailConflict` (before any actuation) if any other channel
    /// is on. Callers must not invoke this concurrently for the same device.
    pub fn power_on(
        &mut self,
        device: &Device,
        hub: &mut dyn HubPort,
        sequencer: &dyn PowerSequencer,
        recharge: Option<RechargeThreshold>,
    ) -> Result<()> {
        if !self.rail.all_channels_off()? {
            return Err(RigError::RailConflict);
        }

        self.supply.rail_switch(PowerState::On)?;

        if !self
            .supply
            .wait_for_availability(self.timings.availability_timeout)?
        {
            return Err(RigError::SupplyUnavailable(
                self.timings.availability_timeout,
            ));
        }

        let mut session = self.supply.connect()?;

        hub.set_state(PortState::Enabled)?;

        self.rail.switch_to(&device.channel)?;
        thread::sleep(self.timings.mux_settle);

        session.set_voltage(device.channel.voltage)?;
        drop(session);

        if !hub.wait_for_availability(self.timings.availability_timeout)? {
            return Err(RigError::DeviceUnavailable(device.name.clone()));
        }
        // raw enumeration is not OS readiness
        thread::sleep(self.timings.post_enumeration_settle);

        sequencer.after_power_on(hub, recharge)?;

        log::info!("Device is ready.");
        Ok(())
    }

    /// Bring a device down. Idempotent: a second call on an already-off
    /// channel only logs a warning. Individual step failures never abort the
    /// shutdown; they are aggregated into a single non-fatal warning.
    pub fn power_off(
        &mut self,
        device: &Device,
        hub: &mut dyn HubPort,
        sequencer: &dyn PowerSequencer,
    ) -> Result<()> {
        let mut failures: Vec<String> = Vec::new();
        let mut note = |label: &str, result: Result<()>| {
            if let Err(e) = result {
                failures.push(format!("{label}: {e}"));
            }
        };

        match self.rail.read_state(&device.channel) {
            Ok(PowerState::Off) => log::warn!("Device appears to be 'off' already."),
            Ok(PowerState::On) => {}
            Err(e) => note("read channel state", Err(e)),
        }

        // collectors that may still be attached to this device
        collectors::kill_stray_collectors();

        match hub.get_state() {
            Ok(PortState::Enabled) => note("disable hub port", hub.set_state(PortState::Disabled)),
            Ok(PortState::Disabled) => {}
            Err(e) => note("read hub port state", Err(e)),
        }

        note("os-level shutdown", sequencer.shutdown_device());

        // de-energize the output through the control channel when reachable;
        // the GPIO channel is switched off below regardless
        let supply_reachable = matches!(self.supply.rail_state(), Ok(PowerState::On))
            && matches!(self.supply.is_available(), Ok(true));
        if supply_reachable {
            match self.supply.connect() {
                Ok(mut session) => {
                    note("zero output voltage", session.set_voltage(0.0));
                    drop(session);
                    thread::sleep(SUPPLY_DISCONNECT_SETTLE);
                }
                Err(e) => note("connect to supply", Err(e)),
            }
        }

        note("switch channel off", self.rail.switch_off(&device.channel));
        note("switch supply off", self.supply.rail_switch(PowerState::Off));

        if !failures.is_empty() {
            log::warn!(
                "Power-down completed with {} degraded step(s): {}",
                failures.len(),
                failures.join("; ")
            );
        }
        Ok(())
    }
}
