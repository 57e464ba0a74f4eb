//! Switch command handler: bring a device up on the rail, down, or read its
//! electrical state back.

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::power::{self, PowerController};
use crate::core::recharge::RechargeThreshold;
use crate::hw::{MonsoonHvpm, RailMux, YkushPort};

use super::load_registry;

/// Execute the switch command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let registry = load_registry(matches)?;
    let name = matches
        .get_one::<String>("device")
        .expect("device is required");
    let state = matches
        .get_one::<String>("state")
        .expect("state is required");

    let device = registry.get(name)?;
    let rail = RailMux::new(registry.channels());
    let supply = MonsoonHvpm::new(registry.supply().clone());
    let mut controller = PowerController::new(Box::new(rail), Box::new(supply));

    if state == "read-state" {
        let state = controller
            .read_state(device)
            .with_context(|| format!("Failed to read the power state of '{name}'"))?;
        println!("{state}");
        return Ok(());
    }

    let mut hub = YkushPort::new(&device.usb)?;
    let sequencer = power::sequencer_for(device)?;

    match state.as_str() {
        "on" => {
            let recharge = matches
                .get_one::<f64>("auto-recharge")
                .map(|&min| RechargeThreshold::new(min, 1.0))
                .transpose()?;
            controller
                .power_on(device, &mut hub, sequencer.as_ref(), recharge)
                .with_context(|| format!("Failed to power '{name}' on"))?;
            println!("{} '{name}' is powered on and ready.", "OK".green().bold());
        }
        "off" => {
            controller
                .power_off(device, &mut hub, sequencer.as_ref())
                .with_context(|| format!("Failed to power '{name}' off"))?;
            println!("{} '{name}' is powered off.", "OK".green().bold());
        }
        other => anyhow::bail!("unknown state '{other}' (expected 'on', 'off' or 'read-state')"),
    }
    Ok(())
}
