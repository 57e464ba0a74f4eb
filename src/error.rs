use std::io;
use std::time::Duration;

use thiserror::Error;

/// Custom error type for the railbench harness
#[derive(Error, Debug)]
pub enum RigError {
    #[error("another channel on the power rail is already switched on")]
    RailConflict,

    #[error("power supply did not become available within {0:?}")]
    SupplyUnavailable(Duration),

    #[error("could not connect to the power supply: {0}")]
    SupplyConnectFailed(String),

    #[error("device '{0}' did not become available on USB")]
    DeviceUnavailable(String),

    #[error("battery threshold ratio {0} is outside [0.0, 1.0]")]
    InvalidRatio(f64),

    #[error("granularity {0} is outside [1, 100]")]
    InvalidGranularity(usize),

    #[error("output format '{format}' does not match extension of '{path}'")]
    FormatMismatch { format: String, path: String },

    #[error("not connected to the power supply")]
    NotConnected,

    #[error("an await is already armed")]
    BarrierAlreadyArmed,

    #[error("unknown device: '{0}'")]
    UnknownDevice(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("device bridge error: {0}")]
    Bridge(String),

    #[error("USB hub error: {0}")]
    Hub(String),

    #[error("barrier service error: {0}")]
    Barrier(String),

    #[error("GPIO error: {0}")]
    Gpio(#[from] gpio_cdev::Error),

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the railbench harness
pub type Result<T> = std::result::Result<T, RigError>;

impl RigError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        RigError::Config(msg.into())
    }

    /// Create a device bridge error
    pub fn bridge<S: Into<String>>(msg: S) -> Self {
        RigError::Bridge(msg.into())
    }
}
