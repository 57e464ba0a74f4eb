//! The named telemetry collectors managed through the process supervisor.
//!
//! Every collector gets its own handle name, so stopping one never affects
//! another. Spawns are fire-and-forget; the fixed settle constants here are
//! what callers sleep after each one.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use crate::core::sampler::OutputFormat;
use crate::core::supervisor::{ProcessSupervisor, StopMode};
use crate::error::{Result, RigError};

pub const ADB_SAMPLER: &str = "adb-sampler";
pub const SUPPLY_SAMPLER: &str = "supply-sampler";
pub const MEMORY_SAMPLER: &str = "memory-sampler";
pub const PAGELOAD_PROXY: &str = "pageload-proxy";
pub const PAGELOAD_SERVER: &str = "pageload-server";
pub const REMOTE_DISPLAY: &str = "remote-display";

/// Settle delays after async spawns (no readiness handshake exists).
pub const SPAWN_SETTLE_SHORT: std::time::Duration = std::time::Duration::from_secs(1);
pub const SPAWN_SETTLE_LONG: std::time::Duration = std::time::Duration::from_secs(5);

/// Command-line substrings identifying collector processes that may still be
/// attached to a device at power-down.
const STRAY_PATTERNS: &[&str] = &[
    "collect-adb-measurements",
    "collect-memory-measurements",
    "mitmdump",
    "pageload-server",
    "supply collect",
    "scrcpy",
];

/// Environment variable overriding the helper-script directory.
pub const SCRIPTS_ENV_VAR: &str = "RAILBENCH_SCRIPTS";

fn script_path(name: &str) -> Result<PathBuf> {
    if let Ok(dir) = env::var(SCRIPTS_ENV_VAR) {
        return Ok(Path::new(&dir).join(name));
    }
    let exe = env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| RigError::config("could not resolve the executable directory"))?;
    Ok(dir.join("scripts").join(name))
}

/// Start the software power/traffic sampler over ADB.
pub fn start_adb_sampler(
    supervisor: &ProcessSupervisor,
    adb_identifier: &str,
    interval_secs: u64,
    output: &Path,
) -> Result<u32> {
    let mut command = Command::new(script_path("collect-adb-measurements")?);
    command
        .arg(adb_identifier)
        .arg(interval_secs.to_string())
        .arg("1")
        .arg(output);
    supervisor.start(ADB_SAMPLER, command)
}

pub fn stop_adb_sampler(supervisor: &ProcessSupervisor) -> Result<()> {
    supervisor.stop(ADB_SAMPLER, StopMode::Kill)
}

/// Start the hardware sampler: this binary re-invoked as `supply collect`,
/// which flushes and closes its output on interrupt.
pub fn start_supply_sampler(
    supervisor: &ProcessSupervisor,
    output: &Path,
    format: OutputFormat,
    granularity: usize,
) -> Result<u32> {
    let mut command = Command::new(env::current_exe()?);
    command
        .arg("supply")
        .arg("collect")
        .arg("--output")
        .arg(output)
        .arg("--format")
        .arg(format.to_string())
        .arg("--granularity")
        .arg(granularity.to_string());
    supervisor.start(SUPPLY_SAMPLER, command)
}

pub fn stop_supply_sampler(supervisor: &ProcessSupervisor) -> Result<()> {
    supervisor.stop(SUPPLY_SAMPLER, StopMode::Interrupt)
}

/// Start the per-app memory sampler over ADB.
pub fn start_memory_sampler(
    supervisor: &ProcessSupervisor,
    adb_identifier: &str,
    app_package: &str,
    output: &Path,
    interval_secs: u64,
) -> Result<u32> {
    let mut command = Command::new(script_path("collect-memory-measurements")?);
    command
        .arg(adb_identifier)
        .arg(app_package)
        .arg(output)
        .arg(format!("--interval={interval_secs}"));
    supervisor.start(MEMORY_SAMPLER, command)
}

pub fn stop_memory_sampler(supervisor: &ProcessSupervisor) -> Result<()> {
    supervisor.stop(MEMORY_SAMPLER, StopMode::Interrupt)
}

/// Start the page-load instrumentation proxy (mitmdump with inject script).
pub fn start_pageload_proxy(
    supervisor: &ProcessSupervisor,
    browser_name: &str,
    server_ip: &str,
    server_port: u16,
) -> Result<u32> {
    let inject = script_path("pageload-inject.py")?;
    let mut command = Command::new("mitmdump");
    command
        .env("BROWSER_NAME", browser_name)
        .env("SERVER_IP", server_ip)
        .env("SERVER_PORT", server_port.to_string())
        .arg("-s")
        .arg(inject)
        .arg("--ssl-insecure")
        .arg("-q");
    supervisor.start(PAGELOAD_PROXY, command)
}

pub fn stop_pageload_proxy(supervisor: &ProcessSupervisor) -> Result<()> {
    supervisor.stop(PAGELOAD_PROXY, StopMode::Terminate)
}

/// Start the HTTPS result-collection server; it flushes results on exit.
pub fn start_pageload_server(
    supervisor: &ProcessSupervisor,
    output_dir: &Path,
    port: u16,
    cert: &Path,
    key: &Path,
) -> Result<u32> {
    if !cert.exists() {
        return Err(RigError::config(format!(
            "SSL certificate not found at {}",
            cert.display()
        )));
    }
    if !key.exists() {
        return Err(RigError::config(format!(
            "SSL key not found at {}",
            key.display()
        )));
    }
    let mut command = Command::new(script_path("pageload-server")?);
    command
        .arg("--port")
        .arg(port.to_string())
        .arg("--cert")
        .arg(cert)
        .arg("--key")
        .arg(key)
        .arg("--output")
        .arg(output_dir);
    supervisor.start(PAGELOAD_SERVER, command)
}

pub fn stop_pageload_server(supervisor: &ProcessSupervisor) -> Result<()> {
    supervisor.stop(PAGELOAD_SERVER, StopMode::Terminate)
}

/// Start the remote-display bridge for an Android device.
pub fn start_remote_display(supervisor: &ProcessSupervisor, adb_identifier: &str) -> Result<u32> {
    let mut command = Command::new("scrcpy");
    command.arg("-s").arg(adb_identifier);
    supervisor.start(REMOTE_DISPLAY, command)
}

pub fn stop_remote_display(supervisor: &ProcessSupervisor) -> Result<()> {
    supervisor.stop(REMOTE_DISPLAY, StopMode::Terminate)
}

/// Best-effort kill of any collector process still running, matched by
/// command-line pattern. Never fails; an already-exited collector is
/// expected, not exceptional.
pub fn kill_stray_collectors() {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );

    let own_pid = std::process::id();
    for (pid, process) in system.processes() {
        if pid.as_u32() == own_pid {
            continue;
        }
        let cmdline = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if STRAY_PATTERNS.iter().any(|p| cmdline.contains(p)) {
            log::info!("Killing stray collector (pid {pid}): {cmdline}");
            process.kill();
        }
    }
}
