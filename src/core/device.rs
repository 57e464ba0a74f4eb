//! Device inventory and the power-rail data model.
//!
//! Devices are loaded once from a JSON configuration file and are immutable
//! for the lifetime of the process. The physical GPIO line, not any in-memory
//! flag, is the source of truth for a channel's power state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, RigError};

/// Environment variable that overrides the configuration file location.
pub const CONFIG_ENV_VAR: &str = "RAILBENCH_CONFIG";

/// Operating-system class of a managed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OsClass {
    Android,
    #[serde(rename = "iOS")]
    Ios,
}

impl std::fmt::Display for OsClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsClass::Android => write!(f, "Android"),
            OsClass::Ios => write!(f, "iOS"),
        }
    }
}

/// Electrical state of a rail channel or the supply's mains relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Off,
    On,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::Off => write!(f, "off"),
            PowerState::On => write!(f, "on"),
        }
    }
}

/// One GPIO-addressable slot on the shared power rail.
///
/// Invariant (enforced by the power controller, not here): across all
/// configured channels at most one may be electrically on at any instant.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerChannel {
    pub gpio_pin: u32,
    /// Rail output voltage programmed after switching to this channel, in V.
    pub voltage: f64,
}

/// USB location of a device: its descriptor id plus the hub port it hangs off.
#[derive(Debug, Clone, Deserialize)]
pub struct UsbDescriptor {
    /// "vvvv:pppp" hex vendor:product pair, as reported by lsusb.
    pub id: String,
    pub ykush_serial: String,
    pub ykush_port: u8,
}

impl UsbDescriptor {
    /// Parse the "vvvv:pppp" id into numeric (vendor, product).
    pub fn vid_pid(&self) -> Result<(u16, u16)> {
        let (vid, pid) = self
            .id
            .split_once(':')
            .ok_or_else(|| RigError::config(format!("malformed usb id '{}'", self.id)))?;
        let vid = u16::from_str_radix(vid, 16)
            .map_err(|_| RigError::config(format!("malformed usb vendor id '{vid}'")))?;
        let pid = u16::from_str_radix(pid, 16)
            .map_err(|_| RigError::config(format!("malformed usb product id '{pid}'")))?;
        Ok((vid, pid))
    }
}

/// A physical device on the bench. Loaded from configuration, never mutated.
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub name: String,
    pub os: OsClass,
    pub usb: UsbDescriptor,
    pub channel: PowerChannel,
    #[serde(default)]
    pub bt_mac_address: Option<String>,
    #[serde(default)]
    pub adb_identifier: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub pin_code: Option<String>,
}

/// Configuration of the shared power supply itself: the GPIO line driving its
/// mains relay and its own USB control-channel descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct SupplyConfig {
    pub gpio_pin: u32,
    pub usb: UsbDescriptor,
}

#[derive(Debug, Deserialize)]
struct RigConfigFile {
    supply: SupplyConfig,
    devices: BTreeMap<String, Device>,
}

/// The loaded device inventory plus the supply configuration.
#[derive(Debug)]
pub struct DeviceRegistry {
    supply: SupplyConfig,
    devices: BTreeMap<String, Device>,
}

impl DeviceRegistry {
    /// Load the registry from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            RigError::config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let parsed: RigConfigFile = serde_json::from_str(&data)?;

        let mut devices = parsed.devices;
        for (name, device) in devices.iter_mut() {
            device.name = name.clone();
        }

        Ok(Self {
            supply: parsed.supply,
            devices,
        })
    }

    /// Load the registry from the default location, honoring the
    /// `RAILBENCH_CONFIG` override.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };
        Self::load_from(&path)
    }

    fn default_config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }
        let base = dirs::config_dir()
            .ok_or_else(|| RigError::config("could not resolve the user config directory"))?;
        Ok(base.join("railbench").join("devices.json"))
    }

    pub fn supply(&self) -> &SupplyConfig {
        &self.supply
    }

    pub fn get(&self, name: &str) -> Result<&Device> {
        self.devices
            .get(name)
            .ok_or_else(|| RigError::UnknownDevice(name.to_string()))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// All rail channels, for mutual-exclusion checks across the whole rack.
    pub fn channels(&self) -> Vec<PowerChannel> {
        self.devices.values().map(|d| d.channel.clone()).collect()
    }
}
