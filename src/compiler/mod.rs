//! Transaction compilation
//!
//! Turns raw hot transactions into `SoftwareTransaction`s: pass grids from
//! the layout, lock sets from a batch-wide lock partition.

pub mod compile;
pub mod locks;

pub use compile::TransactionCompiler;
pub use locks::{assign_locks, LockPartition};
