//! Hot-key placement
//!
//! `KeyLayoutPlanner` turns a transaction history into a `Layout`, the fixed
//! home of every hot key inside the switch's register space. `HotBatchIter`
//! cuts a raw transaction stream into batches of hot parts.

pub mod batching;
pub mod key_layout;
pub mod planner;

pub use batching::HotBatchIter;
pub use key_layout::Layout;
pub use planner::{build_adjacency, count_frequencies, hot_keys, hot_set_size, KeyLayoutPlanner};
