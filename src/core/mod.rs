// Core orchestration: rail arbitration, collectors, sampling, supervision.
pub mod collectors;
pub mod device;
pub mod measure;
pub mod power;
pub mod recharge;
pub mod sampler;
pub mod supervisor;

pub use device::{Device, DeviceRegistry, OsClass, PowerChannel, PowerState};
pub use power::{PowerController, PowerSequencer, PowerTimings};
pub use recharge::RechargeThreshold;
pub use sampler::{CollectConfig, OutputFormat, SampleEngine};
pub use supervisor::{HandleStore, ProcessSupervisor, StopMode};
