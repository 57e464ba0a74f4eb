// Synchronization primitives: filesystem time anchors and the HTTP barrier.
pub mod anchor;
pub mod barrier;

pub use anchor::{read_anchor, write_anchor, ANCHOR_FILENAME};
pub use barrier::{AwaitService, WaitOutcome};
