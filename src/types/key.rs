use serde::{Deserialize, Serialize};
use std::fmt;

/// 64-bit database key
#[derive(
    Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct Key(pub u64);

impl Key {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Key {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// One register array: `(stage, register)` inside the ingress pipeline.
///
/// Ordering is stage-major, which is also the order a packet visits them.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct RegisterId {
    pub stage: usize,
    pub register: usize,
}

impl RegisterId {
    pub const fn new(stage: usize, register: usize) -> Self {
        Self { stage, register }
    }

    /// Stage-major flat index, `stage * regs_per_stage + register`
    #[inline]
    pub fn flat(&self, regs_per_stage: usize) -> usize {
        self.stage * regs_per_stage + self.register
    }

    #[inline]
    pub fn from_flat(flat: usize, regs_per_stage: usize) -> Self {
        Self {
            stage: flat / regs_per_stage,
            register: flat % regs_per_stage,
        }
    }
}

/// Physical home of a hot key: one slot of one register array
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Location {
    pub stage: usize,
    pub register: usize,
    pub slot: u32,
}

impl Location {
    pub const fn new(stage: usize, register: usize, slot: u32) -> Self {
        Self {
            stage,
            register,
            slot,
        }
    }

    #[inline]
    pub fn register_id(&self) -> RegisterId {
        RegisterId::new(self.stage, self.register)
    }

    /// Two locations collide when they share a register array
    #[inline]
    pub fn same_register(&self, other: &Location) -> bool {
        self.stage == other.stage && self.register == other.register
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{s={},r={},i={}}}", self.stage, self.register, self.slot)
    }
}
