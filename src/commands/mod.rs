// Command handlers module
pub mod barrier;
pub mod devices;
pub mod init_state;
pub mod measuring;
pub mod supply;
pub mod switch;

use std::path::Path;

use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::core::device::DeviceRegistry;

/// Load the device registry, honoring the global `--config` override.
pub(crate) fn load_registry(matches: &ArgMatches) -> Result<DeviceRegistry> {
    let explicit = matches.get_one::<String>("config").map(Path::new);
    DeviceRegistry::load(explicit).context("Failed to load the device configuration")
}
