//! Switch hot-key transaction offload
//!
//! Plans a layout of hot keys onto the register arrays of a programmable
//! switch, compiles transactions into multi-pass register programs with
//! conflict locks, and simulates the ingress pipeline cycle by cycle while
//! checking that the committed schedule is conflict-serializable.

pub mod types;
pub mod error;
pub mod config;
pub mod layout;
pub mod compiler;
pub mod pipeline;
pub mod verify;
pub mod wire;
pub mod bench;

pub use config::*;
pub use error::*;
pub use types::*;
pub use layout::{HotBatchIter, KeyLayoutPlanner, Layout};
pub use compiler::{assign_locks, LockPartition, TransactionCompiler};
pub use pipeline::{
    run_to_completion, Completion, DriverConfig, LockDecision, LockPolicy, LockTable,
    PipelineSimulator, RunReport, SharedSimulator, SimulatorStats,
};
pub use verify::SerializabilityChecker;
pub use wire::{RegisterInstr, SwitchPacket};
