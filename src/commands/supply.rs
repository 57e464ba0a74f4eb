//! Supply command handler: direct control of the power supply and the
//! sampling loop. `supply collect` is also what the measurement session
//! re-invokes as the hardware-sampler collector process.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::device::PowerState;
use crate::core::sampler::{self, CollectConfig, OutputFormat, SampleEngine};
use crate::hw::{MonsoonHvpm, Supply};

use super::load_registry;

const SUPPLY_AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Execute the supply command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let registry = load_registry(matches)?;
    let mut supply = MonsoonHvpm::new(registry.supply().clone());

    match matches.subcommand() {
        Some(("init-state", _)) => {
            supply.init_state()?;
            Ok(())
        }
        Some(("read-state", _)) => {
            let state = supply.rail_state()?;
            println!("{state}");
            Ok(())
        }
        Some(("switch", sub)) => {
            let state = match sub
                .get_one::<String>("state")
                .expect("state is required")
                .as_str()
            {
                "on" => PowerState::On,
                _ => PowerState::Off,
            };
            supply.rail_switch(state)?;
            Ok(())
        }
        Some(("set-voltage", sub)) => {
            let volts = *sub.get_one::<f64>("volts").expect("volts is required");
            let mut session = connect(&mut supply)?;
            log::info!("Setting voltage to: {volts}");
            session.set_voltage(volts)?;
            Ok(())
        }
        Some(("collect", sub)) => collect(&mut supply, sub),
        _ => anyhow::bail!("missing supply subcommand"),
    }
}

fn connect(supply: &mut MonsoonHvpm) -> Result<Box<dyn crate::hw::SupplySession>> {
    if !supply
        .wait_for_availability(SUPPLY_AVAILABILITY_TIMEOUT)
        .context("availability probe failed")?
    {
        anyhow::bail!("power supply is not available");
    }
    Ok(supply.connect()?)
}

fn collect(supply: &mut MonsoonHvpm, matches: &ArgMatches) -> Result<()> {
    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .expect("output has a default");
    let format: OutputFormat = matches
        .get_one::<String>("format")
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(OutputFormat::Csv);

    let mut config = CollectConfig::new(output, format);
    config.granularity = matches.get_one::<usize>("granularity").copied().unwrap_or(1);
    config.duration = matches
        .get_one::<u64>("duration")
        .map(|&secs| Duration::from_secs(secs));
    config.throttle = matches
        .get_one::<u64>("t-sleep")
        .map(|&ms| Duration::from_millis(ms))
        .unwrap_or(Duration::ZERO);

    // validate before touching hardware
    config.validate()?;

    let stop = sampler::install_interrupt_flag()?;
    let mut session = connect(supply)?;

    match config.duration {
        Some(duration) => log::info!("Collecting measurements for {}s...", duration.as_secs()),
        None => log::info!("Collecting measurements..."),
    }

    let mut engine = SampleEngine::new(session.as_mut());
    let start_time = engine.collect(&config, &stop)?;

    println!(
        "{} start anchor: {}",
        "Done!".green().bold(),
        crate::sync::anchor::format_anchor(start_time)
    );
    Ok(())
}
