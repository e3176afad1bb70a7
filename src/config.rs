//! Switch and planner configuration
//!
//! Hardware dimensions default to an 18-stage pipeline with two register
//! arrays per stage sharing ~14M register slots, 32 front-panel ports in 8
//! port groups, and a 3-lock conflict table.

use crate::error::{OffloadError, OffloadResult};
use crate::types::MAX_LOCKS;
use serde::{Deserialize, Serialize};

/// Total register slots across the whole pipeline
const TOTAL_REGISTER_SLOTS: usize = 14_000_000;

/// Largest flat register index the 7-bit wire type field can address (1-based)
const MAX_WIRE_REGISTERS: usize = 127;

/// Pipeline configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Ingress pipeline stages
    pub num_stages: usize,
    /// Register arrays per stage
    pub regs_per_stage: usize,
    /// Slots per register array
    pub slots_per_reg: usize,
    /// Front-panel ports
    pub num_ports: usize,
    /// Port groups; each owns one input buffer and one parser
    pub num_port_groups: usize,
    /// Packets each input buffer holds
    pub ipb_capacity: usize,
    /// Lock ids available to the conflict-lock table
    pub num_locks: usize,
    /// Failed lock attempts before a transaction is ejected as aborted
    pub max_fail_count: u32,
    /// In-flight transaction slots
    pub pool_capacity: usize,
    /// Register instructions one wire packet carries
    pub max_hot_ops: usize,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        let num_stages = 18;
        let regs_per_stage = 2;
        Self {
            num_stages,
            regs_per_stage,
            slots_per_reg: TOTAL_REGISTER_SLOTS / (num_stages * regs_per_stage),
            num_ports: 32,
            num_port_groups: 8,
            ipb_capacity: 500,
            num_locks: 3,
            max_fail_count: 8,
            pool_capacity: 4096,
            max_hot_ops: 8,
        }
    }
}

impl SwitchConfig {
    /// Small pipeline for tests and examples
    pub fn with_dimensions(num_stages: usize, regs_per_stage: usize, slots_per_reg: usize) -> Self {
        Self {
            num_stages,
            regs_per_stage,
            slots_per_reg,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> OffloadResult<()> {
        let invalid = |msg: String| Err(OffloadError::InvalidConfig(msg));

        if self.num_stages == 0 || self.regs_per_stage == 0 || self.slots_per_reg == 0 {
            return invalid(format!(
                "register space must be non-empty ({} stages x {} regs x {} slots)",
                self.num_stages, self.regs_per_stage, self.slots_per_reg
            ));
        }
        if self.num_registers() > MAX_WIRE_REGISTERS {
            return invalid(format!(
                "{} register arrays exceed the {} addressable on the wire",
                self.num_registers(),
                MAX_WIRE_REGISTERS
            ));
        }
        if self.slots_per_reg > u32::MAX as usize {
            return invalid(format!("{} slots per register", self.slots_per_reg));
        }
        if self.num_locks == 0 || self.num_locks > MAX_LOCKS {
            return invalid(format!(
                "num_locks must be in 1..={}, got {}",
                MAX_LOCKS, self.num_locks
            ));
        }
        if self.num_port_groups == 0 || self.num_ports == 0 {
            return invalid("need at least one port and one port group".into());
        }
        if self.num_ports % self.num_port_groups != 0 {
            return invalid(format!(
                "{} ports do not split evenly into {} groups",
                self.num_ports, self.num_port_groups
            ));
        }
        if self.ipb_capacity == 0 {
            return invalid("ipb_capacity must be positive".into());
        }
        if self.pool_capacity == 0 || self.pool_capacity > u32::MAX as usize {
            return invalid(format!("pool_capacity {}", self.pool_capacity));
        }
        if self.max_hot_ops == 0 {
            return invalid("max_hot_ops must be positive".into());
        }
        Ok(())
    }

    /// Register arrays in the whole pipeline
    #[inline]
    pub fn num_registers(&self) -> usize {
        self.num_stages * self.regs_per_stage
    }

    /// Hot keys the register space can hold
    #[inline]
    pub fn register_capacity(&self) -> usize {
        self.num_registers() * self.slots_per_reg
    }

    #[inline]
    pub fn port_group(&self, port: usize) -> usize {
        port / (self.num_ports / self.num_port_groups)
    }

    /// Index of the recirculation port among the input buffers
    #[inline]
    pub fn recirc_port(&self) -> usize {
        self.num_port_groups
    }
}

/// How the planner picks a register array for each hot key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementStrategy {
    /// Greedy min-conflict: fewest already-placed co-accessed keys
    FrequencyHeuristic,
    /// First-seen order, slot-major round robin over all register arrays
    NaiveSpray,
    /// Uniformly random register array per key
    RandomSpray { seed: u64 },
}

impl Default for PlacementStrategy {
    fn default() -> Self {
        PlacementStrategy::FrequencyHeuristic
    }
}

/// Planner configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Fraction of distinct keys, hottest first, that become hot
    pub hot_fraction: f64,
    pub strategy: PlacementStrategy,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            hot_fraction: 1.0,
            strategy: PlacementStrategy::default(),
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> OffloadResult<()> {
        if !(self.hot_fraction > 0.0 && self.hot_fraction <= 1.0) {
            return Err(OffloadError::InvalidConfig(format!(
                "hot_fraction must be in (0, 1], got {}",
                self.hot_fraction
            )));
        }
        Ok(())
    }
}
