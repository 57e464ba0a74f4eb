//! Device inventory listing.

use anyhow::Result;
use clap::ArgMatches;
use colored::Colorize;

use super::load_registry;

/// Execute the devices command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let registry = load_registry(matches)?;

    println!("{}", "Configured devices:".bold());
    for device in registry.devices() {
        println!(
            "  {} ({}) - pin {}, {:.2} V, usb {}",
            device.name.cyan(),
            device.os,
            device.channel.gpio_pin,
            device.channel.voltage,
            device.usb.id.dimmed(),
        );
    }
    Ok(())
}
