use serde::{Deserialize, Serialize};
use std::fmt;

/// Widest lock set the hardware packet can carry
pub const MAX_LOCKS: usize = 32;

/// Fixed-width bitset over lock ids
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct LockSet(u32);

impl LockSet {
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn set(&mut self, lock: usize) {
        debug_assert!(lock < MAX_LOCKS);
        self.0 |= 1u32 << lock;
    }

    #[inline]
    pub fn contains(&self, lock: usize) -> bool {
        debug_assert!(lock < MAX_LOCKS);
        self.0 & (1u32 << lock) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    #[inline]
    pub fn union(&self, other: LockSet) -> LockSet {
        LockSet(self.0 | other.0)
    }

    #[inline]
    pub fn intersection(&self, other: LockSet) -> LockSet {
        LockSet(self.0 & other.0)
    }

    /// Bits in `self` that are not in `other`
    #[inline]
    pub fn difference(&self, other: LockSet) -> LockSet {
        LockSet(self.0 & !other.0)
    }

    #[inline]
    pub fn intersects(&self, other: LockSet) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn is_superset(&self, other: LockSet) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn union_inplace(&mut self, other: LockSet) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove_all(&mut self, other: LockSet) {
        self.0 &= !other.0;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Lock ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_LOCKS).filter(move |&i| self.contains(i))
    }
}

impl fmt::Debug for LockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
