//! iOS bridge: clock sync and the USB trust-authorization unlock sequence.
//!
//! iOS requires a screen unlock once per boot before host tooling may talk to
//! the device. The unlock keystrokes ride on an external Bluetooth-HID client
//! binary; this module only sequences it.

use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::bridge::DeviceBridge;
use crate::core::device::Device;
use crate::core::supervisor::{ProcessSupervisor, StopMode};
use crate::error::{Result, RigError};

const STEP_SETTLE: Duration = Duration::from_secs(1);

/// Handle-store name for the transient BT connector daemon.
pub const BT_BRIDGE_HANDLE: &str = "bt-bridge";

pub struct IosBridge {
    bt_mac_address: String,
    pin_code: Option<String>,
}

impl IosBridge {
    pub fn new(device: &Device) -> Result<Self> {
        let bt_mac_address = device.bt_mac_address.clone().ok_or_else(|| {
            RigError::bridge(format!("device '{}' has no bluetooth address", device.name))
        })?;
        Ok(Self {
            bt_mac_address,
            pin_code: device.pin_code.clone(),
        })
    }

    fn hid_client(args: &[&str]) -> Result<()> {
        let client = which::which("bt-hid-client")
            .map_err(|_| RigError::bridge("'bt-hid-client' not found in PATH"))?;
        let output = Command::new(client).args(args).output()?;
        if !output.status.success() {
            return Err(RigError::bridge(format!(
                "bt-hid-client {args:?} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Align the device clock with the host clock.
    pub fn sync_clock(&self) -> Result<()> {
        let idevicedate = which::which("idevicedate")
            .map_err(|_| RigError::bridge("'idevicedate' not found in PATH"))?;
        let output = Command::new(idevicedate).arg("-c").output()?;
        if !output.status.success() {
            return Err(RigError::bridge(format!(
                "idevicedate -c failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    pub fn unlock_screen(&self) -> Result<()> {
        match &self.pin_code {
            Some(pin) => Self::hid_client(&["unlock", "--pin", pin]),
            None => Self::hid_client(&["unlock"]),
        }
    }

    pub fn lock_screen(&self) -> Result<()> {
        Self::hid_client(&["lock"])
    }

    /// Transient connect -> unlock -> lock -> disconnect sequence that
    /// authorizes the USB trust relationship after a cold boot.
    pub fn authorize_usb_trust(&self, supervisor: &ProcessSupervisor) -> Result<()> {
        let mut connector = Command::new("bt-hid-client");
        connector.args(["connect", &self.bt_mac_address]);
        supervisor.start(BT_BRIDGE_HANDLE, connector)?;
        thread::sleep(STEP_SETTLE);

        self.unlock_screen()?;
        thread::sleep(STEP_SETTLE);
        self.lock_screen()?;
        thread::sleep(STEP_SETTLE);

        supervisor.stop(BT_BRIDGE_HANDLE, StopMode::Interrupt)?;
        Ok(())
    }
}

impl DeviceBridge for IosBridge {
    fn battery_ratio(&self) -> Result<f64> {
        Err(RigError::bridge(
            "battery readout over the iOS bridge is not supported",
        ))
    }

    fn power_off(&self) -> Result<()> {
        let diagnostics = which::which("idevicediagnostics")
            .map_err(|_| RigError::bridge("'idevicediagnostics' not found in PATH"))?;
        let output = Command::new(diagnostics).arg("shutdown").output()?;
        if !output.status.success() {
            return Err(RigError::bridge(format!(
                "idevicediagnostics shutdown failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
