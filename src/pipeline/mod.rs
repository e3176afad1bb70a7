//! Switch pipeline model
//!
//! `PipelineSimulator` is the cycle-level model; `LockTable` arbitrates
//! admission under a `LockPolicy`; `SlotPool` owns in-flight transactions;
//! `run_to_completion` is a closed-loop driver over a prepared batch.

pub mod driver;
pub mod lock_protocol;
pub mod shared;
pub mod simulator;
pub mod slot_pool;
pub mod stats;


pub use driver::{run_to_completion, DriverConfig, RunReport};
pub use lock_protocol::{LockDecision, LockPolicy, LockTable};
pub use shared::SharedSimulator;
pub use simulator::{Completion, PipelineSimulator};
pub use slot_pool::{SlotId, SlotPool};
pub use stats::SimulatorStats;
