//! Device bridges: host-side tooling for talking to a powered device.
//!
//! These stay at interface level; scripted UI automation itself is driven by
//! external command sets, not by this crate.

pub mod adb;
pub mod ios;

pub use adb::AdbBridge;
pub use ios::IosBridge;

use crate::error::Result;

/// The subset of bridge behavior the power orchestration needs.
pub trait DeviceBridge {
    /// Current battery charge as reported-level / reported-scale, in [0, 1].
    fn battery_ratio(&self) -> Result<f64>;

    /// Power the device off at the OS level.
    fn power_off(&self) -> Result<()>;
}
