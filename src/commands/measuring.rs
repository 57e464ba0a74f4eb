//! Measuring command handler: start/stop a telemetry-collection session.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::measure::{self, MeasureOptions};
use crate::core::sampler::OutputFormat;
use crate::core::supervisor::{HandleStore, ProcessSupervisor};
use crate::hw::{RailMux, YkushPort};

use super::load_registry;

fn supervisor(matches: &ArgMatches) -> Result<ProcessSupervisor> {
    // a session-scoped handle dir keeps parallel racks from clobbering
    // each other's PIDs
    match matches.get_one::<String>("pid-dir") {
        Some(dir) => Ok(ProcessSupervisor::new(HandleStore::new(dir))),
        None => Ok(ProcessSupervisor::with_default_store()?),
    }
}

/// Execute the measuring command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let registry = load_registry(matches)?;
    let name = matches
        .get_one::<String>("device")
        .expect("device is required");
    let action = matches
        .get_one::<String>("action")
        .expect("action is required");

    let device = registry.get(name)?;
    let mut rail = RailMux::new(registry.channels());
    let mut hub = YkushPort::new(&device.usb)?;
    let supervisor = supervisor(matches)?;

    match action.as_str() {
        "start" => {
            let output_dir = matches
                .get_one::<String>("output")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    PathBuf::from(format!(
                        "measurements-{}",
                        chrono::Local::now().format("%Y%m%d-%H%M%S")
                    ))
                });
            let options = MeasureOptions {
                format: matches
                    .get_one::<String>("format")
                    .map(|s| s.parse())
                    .transpose()?
                    .unwrap_or(OutputFormat::Csv),
                granularity: matches.get_one::<usize>("granularity").copied().unwrap_or(1),
                recharge_target: matches.get_one::<f64>("auto-recharge").copied(),
            };
            measure::start_measuring(device, &mut rail, &mut hub, &supervisor, &output_dir, &options)
                .with_context(|| format!("Failed to start measuring on '{name}'"))?;
            println!(
                "{} Collectors running; output under {}.",
                "OK".green().bold(),
                output_dir.display()
            );
        }
        "stop" => {
            measure::stop_measuring(device, &mut rail, &mut hub, &supervisor)
                .with_context(|| format!("Failed to stop measuring on '{name}'"))?;
            println!("{} Collectors stopped.", "OK".green().bold());
        }
        other => anyhow::bail!("unknown action '{other}' (expected 'start' or 'stop')"),
    }
    Ok(())
}
