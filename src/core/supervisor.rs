//! Background-process supervision via a filesystem handle store.
//!
//! Collector subprocesses outlive the invocation that started them, so their
//! identifiers are persisted as one small file per name. "stop" reads the
//! file back from a later invocation; a process that already exited is a
//! warning, never an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};

use crate::error::{Result, RigError};

/// How a collector should be asked to go away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Immediate kill, for pure samplers with nothing to flush.
    Kill,
    /// Interrupt, for samplers that flush buffers on a clean stop.
    Interrupt,
    /// Graceful terminate, for servers that write results on exit.
    Terminate,
}

impl StopMode {
    fn signal(self) -> Signal {
        match self {
            StopMode::Kill => Signal::Kill,
            StopMode::Interrupt => Signal::Interrupt,
            StopMode::Terminate => Signal::Term,
        }
    }
}

/// Named persisted process identifiers: `{store_dir}/{name}` holds the PID as
/// decimal text.
pub struct HandleStore {
    dir: PathBuf,
}

impl HandleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The well-known store shared by all invocations of the tool.
    pub fn default_store() -> Result<Self> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| RigError::config("could not resolve the local data directory"))?;
        Ok(Self::new(base.join("railbench").join("pids")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn put(&self, name: &str, pid: u32) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(name), pid.to_string())?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<u32>> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        match raw.trim().parse() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => {
                log::warn!("Handle file {} holds no valid pid.", path.display());
                Ok(None)
            }
        }
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Starts and stops independent, long-running collector subprocesses.
pub struct ProcessSupervisor {
    store: HandleStore,
}

impl ProcessSupervisor {
    pub fn new(store: HandleStore) -> Self {
        Self { store }
    }

    pub fn with_default_store() -> Result<Self> {
        Ok(Self::new(HandleStore::default_store()?))
    }

    pub fn store(&self) -> &HandleStore {
        &self.store
    }

    /// Spawn `command` detached and persist its PID under `name`.
    ///
    /// Returns immediately; there is no readiness handshake. Callers that
    /// need the process visible insert their own settle delay.
    pub fn start(&self, name: &str, mut command: Command) -> Result<u32> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id();
        self.store.put(name, pid)?;
        log::info!("Started '{name}' (pid {pid}).");
        // the child is intentionally not waited on; it outlives this process
        drop(child);
        Ok(pid)
    }

    /// Signal the process persisted under `name`. A missing handle or an
    /// already-exited process completes with a warning.
    pub fn stop(&self, name: &str, mode: StopMode) -> Result<()> {
        let Some(pid) = self.store.get(name)? else {
            log::warn!("Could not stop '{name}'. No handle on record.");
            return Ok(());
        };

        let mut system = System::new();
        let target = Pid::from_u32(pid);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::nothing(),
        );

        match system.process(target) {
            Some(process) => {
                if process.kill_with(mode.signal()).is_none() {
                    // unsupported signal on this platform; fall back to kill
                    process.kill();
                }
                log::info!("Stopped '{name}' (pid {pid}).");
            }
            None => {
                log::warn!("Could not stop '{name}'. Process already stopped.");
            }
        }
        Ok(())
    }
}
