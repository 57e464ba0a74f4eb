//! Barrier command handler: run the await service, or arm a wait.

use std::time::Duration;

use anyhow::Result;
use clap::ArgMatches;
use colored::Colorize;

use crate::sync::barrier::{AwaitService, WaitOutcome, DEFAULT_PORT};

/// Execute the barrier command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(DEFAULT_PORT);
    let service = AwaitService::bind(&format!("0.0.0.0:{port}"))?;

    match matches.subcommand() {
        Some(("serve", _)) => {
            println!(
                "Await service listening on {}. Press ctrl-c to exit.",
                service.local_addr()
            );
            loop {
                std::thread::sleep(Duration::from_secs(60));
            }
        }
        Some(("await", sub)) => {
            let timeout = sub
                .get_one::<u64>("timeout")
                .map(|&secs| Duration::from_secs(secs));
            match service.arm(timeout)? {
                WaitOutcome::Satisfied => {
                    println!("{} continue signal received.", "OK".green().bold());
                }
                WaitOutcome::TimedOut => {
                    println!("{} timed out waiting for the continue signal.", "Warning:".yellow().bold());
                }
            }
            Ok(())
        }
        _ => anyhow::bail!("missing barrier subcommand"),
    }
}
