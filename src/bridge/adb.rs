//! ADB bridge for Android devices.

use std::path::PathBuf;
use std::process::Command;

use crate::bridge::DeviceBridge;
use crate::core::device::Device;
use crate::error::{Result, RigError};

/// TCP port adb listens on when adb-over-wifi is enabled.
pub const WIFI_ADB_PORT: u16 = 5555;

/// Battery report parsed from `dumpsys battery`.
#[derive(Debug, Clone, Copy)]
pub struct BatteryDetails {
    pub level: u32,
    pub scale: u32,
}

impl BatteryDetails {
    pub fn ratio(&self) -> f64 {
        f64::from(self.level) / f64::from(self.scale)
    }
}

/// Shell-out wrapper around the `adb` binary for one device.
pub struct AdbBridge {
    adb: PathBuf,
    serial: String,
}

impl AdbBridge {
    /// Bridge over the device's USB serial.
    pub fn new(device: &Device) -> Result<Self> {
        let serial = device
            .adb_identifier
            .clone()
            .ok_or_else(|| RigError::bridge(format!("device '{}' has no adb identifier", device.name)))?;
        Ok(Self {
            adb: Self::resolve_adb()?,
            serial,
        })
    }

    /// Bridge over the device's wifi endpoint, for use while its USB port is
    /// powered down during measurement.
    pub fn over_wifi(device: &Device) -> Result<Self> {
        let ip = device
            .ip
            .as_deref()
            .ok_or_else(|| RigError::bridge(format!("device '{}' has no ip configured", device.name)))?;
        Ok(Self {
            adb: Self::resolve_adb()?,
            serial: format!("{ip}:{WIFI_ADB_PORT}"),
        })
    }

    fn resolve_adb() -> Result<PathBuf> {
        which::which("adb").map_err(|_| RigError::bridge("'adb' not found in PATH"))
    }

    /// The serial this bridge addresses (USB serial or `ip:port`).
    pub fn serial(&self) -> &str {
        &self.serial
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.adb)
            .args(["-s", &self.serial])
            .args(args)
            .output()?;
        if !output.status.success() {
            return Err(RigError::bridge(format!(
                "adb {args:?} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub fn battery_details(&self) -> Result<BatteryDetails> {
        let report = self.run(&["shell", "dumpsys", "battery"])?;
        let mut level = None;
        let mut scale = None;
        for line in report.lines() {
            if let Some((key, value)) = line.split_once(':') {
                match key.trim() {
                    "level" => level = value.trim().parse().ok(),
                    "scale" => scale = value.trim().parse().ok(),
                    _ => {}
                }
            }
        }
        match (level, scale) {
            (Some(level), Some(scale)) if scale > 0 => Ok(BatteryDetails { level, scale }),
            _ => Err(RigError::bridge("could not parse battery level/scale from dumpsys")),
        }
    }

    /// Total (rx, tx) bytes across the device's non-loopback interfaces.
    pub fn traffic(&self) -> Result<(u64, u64)> {
        let report = self.run(&["shell", "cat", "/proc/net/dev"])?;
        Ok(parse_traffic(&report))
    }

    /// Restart adbd listening on TCP so the bridge survives USB power-down.
    pub fn enable_wifi_adb(&self, ip: &str) -> Result<()> {
        self.run(&["tcpip", &WIFI_ADB_PORT.to_string()])?;
        // adb handles reconnection itself; connect from the host side
        let endpoint = format!("{ip}:{WIFI_ADB_PORT}");
        let output = Command::new(&self.adb).args(["connect", &endpoint]).output()?;
        if !output.status.success() {
            return Err(RigError::bridge(format!(
                "adb connect {endpoint} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    pub fn disable_wifi_adb(&self, ip: &str) -> Result<()> {
        let endpoint = format!("{ip}:{WIFI_ADB_PORT}");
        let output = Command::new(&self.adb)
            .args(["disconnect", &endpoint])
            .output()?;
        if !output.status.success() {
            log::warn!(
                "adb disconnect {endpoint} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Sum (rx, tx) byte counters over every non-loopback interface in a
/// `/proc/net/dev` report.
fn parse_traffic(report: &str) -> (u64, u64) {
    let mut rx = 0u64;
    let mut tx = 0u64;
    for line in report.lines().skip(2) {
        let Some((iface, counters)) = line.split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }
        let fields: Vec<&str> = counters.split_whitespace().collect();
        if fields.len() >= 9 {
            rx += fields[0].parse::<u64>().unwrap_or(0);
            tx += fields[8].parse::<u64>().unwrap_or(0);
        }
    }
    (rx, tx)
}

impl DeviceBridge for AdbBridge {
    fn battery_ratio(&self) -> Result<f64> {
        Ok(self.battery_details()?.ratio())
    }

    fn power_off(&self) -> Result<()> {
        self.run(&["shell", "reboot", "-p"])?;
        Ok(())
    }
}
