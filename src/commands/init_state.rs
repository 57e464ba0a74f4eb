//! One-time GPIO initialization of the rig, required once per host boot.

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::hw::{MonsoonHvpm, RailMux};

use super::load_registry;

/// Execute the init-state command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let registry = load_registry(matches)?;

    RailMux::new(registry.channels())
        .init_state()
        .context("Failed to initialize the rail channels")?;
    MonsoonHvpm::new(registry.supply().clone())
        .init_state()
        .context("Failed to initialize the supply relay")?;

    println!(
        "{} All rail channels and the supply relay are initialized to off.",
        "OK".green().bold()
    );
    Ok(())
}
