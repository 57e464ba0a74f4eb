// Railbench Library - Public API

// Re-export error types
pub mod error;
pub use error::{Result, RigError};

// Module declarations
pub mod bridge;
pub mod commands;
pub mod core;
pub mod hw;
pub mod sync;

// Re-export commonly used types
pub use crate::core::device::{Device, DeviceRegistry, OsClass, PowerChannel, PowerState};

// Initialize logging
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
