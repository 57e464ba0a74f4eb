//! Time-anchor exchange across process boundaries.
//!
//! The sampler records its own start clock in a small file beside the output.
//! Later analysis aligns sampler-relative offsets against wall-clock events
//! through this file; it cannot be reconstructed after the fact, so absence
//! on read is a hard failure.

use std::fs;
use std::path::Path;

use crate::error::{Result, RigError};

/// File name of the anchor, written beside the sample output.
pub const ANCHOR_FILENAME: &str = ".t_monsoon";

/// Canonical text form of an anchor: decimal seconds since the epoch.
///
/// Writers and readers must agree byte-for-byte with the value used to
/// timestamp the batch, so all formatting goes through here.
pub fn format_anchor(start_time: f64) -> String {
    format!("{start_time}")
}

/// Write the anchor for a measurement batch rooted at `dir`.
pub fn write_anchor(dir: &Path, start_time: f64) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(ANCHOR_FILENAME), format_anchor(start_time))?;
    Ok(())
}

/// Read the anchor back. A missing anchor is a hard error.
pub fn read_anchor(dir: &Path) -> Result<f64> {
    let path = dir.join(ANCHOR_FILENAME);
    let raw = fs::read_to_string(&path).map_err(|e| {
        RigError::config(format!("sync anchor missing at {}: {e}", path.display()))
    })?;
    raw.trim()
        .parse()
        .map_err(|_| RigError::config(format!("sync anchor at {} is not a number", path.display())))
}
