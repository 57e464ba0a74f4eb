//! YKUSH hub port control and USB-level device availability.
//!
//! Port switching goes through the vendor `ykushcmd` binary; availability is
//! checked by enumerating the bus with rusb and matching the configured
//! vendor:product pair.

use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::core::device::UsbDescriptor;
use crate::error::{Result, RigError};
use crate::hw::HubPort;

/// Retries against the hub's transient error state before giving up.
const HUB_STATE_ERROR_PATIENCE: u32 = 3;
const HUB_STATE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Power-delivery state of a hub port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Enabled,
    Disabled,
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Enabled => write!(f, "enabled"),
            PortState::Disabled => write!(f, "disabled"),
        }
    }
}

/// One port on a YKUSH-style switchable hub.
pub struct YkushPort {
    usb: UsbDescriptor,
    ykushcmd: PathBuf,
}

impl YkushPort {
    pub fn new(usb: &UsbDescriptor) -> Result<Self> {
        let ykushcmd = which::which("ykushcmd")
            .map_err(|_| RigError::Hub("'ykushcmd' not found in PATH".to_string()))?;
        Ok(Self {
            usb: usb.clone(),
            ykushcmd,
        })
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.ykushcmd)
            .args(["-s", &self.usb.ykush_serial])
            .args(args)
            .output()?;
        if !output.status.success() {
            return Err(RigError::Hub(format!(
                "ykushcmd {args:?} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// One probe of the port state. The hub occasionally reports a transient
    /// error state, which is surfaced as `None` for the caller to retry.
    fn probe_state(&self) -> Result<Option<PortState>> {
        let port = self.usb.ykush_port.to_string();
        let report = self.run(&["-g", &port])?;
        let report = report.to_uppercase();
        if report.contains("ON") || report.contains("UP") {
            Ok(Some(PortState::Enabled))
        } else if report.contains("OFF") || report.contains("DOWN") {
            Ok(Some(PortState::Disabled))
        } else {
            Ok(None)
        }
    }

    fn all_available_ids() -> Result<Vec<(u16, u16)>> {
        let mut ids = Vec::new();
        for device in rusb::devices()?.iter() {
            if let Ok(descriptor) = device.device_descriptor() {
                ids.push((descriptor.vendor_id(), descriptor.product_id()));
            }
        }
        Ok(ids)
    }
}

impl HubPort for YkushPort {
    fn set_state(&mut self, state: PortState) -> Result<()> {
        let port = self.usb.ykush_port.to_string();
        let flag = match state {
            PortState::Enabled => "-u",
            PortState::Disabled => "-d",
        };
        self.run(&[flag, &port])?;
        Ok(())
    }

    fn get_state(&mut self) -> Result<PortState> {
        let mut patience = HUB_STATE_ERROR_PATIENCE;
        loop {
            if let Some(state) = self.probe_state()? {
                return Ok(state);
            }
            if patience == 0 {
                return Err(RigError::Hub(format!(
                    "persistent error state while reading ykush port '{}'",
                    self.usb.ykush_port
                )));
            }
            patience -= 1;
            thread::sleep(HUB_STATE_RETRY_DELAY);
        }
    }

    fn is_device_available(&mut self) -> Result<bool> {
        let target = self.usb.vid_pid()?;
        Ok(Self::all_available_ids()?.contains(&target))
    }
}
