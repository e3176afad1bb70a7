//! Key -> register-slot mapping
//!
//! Holds the forward map (key to location), a per-register reverse map (slot
//! to key) and the access-frequency table the compiler sorts by. Slots inside
//! a register array are handed out append-only, so the reverse map is a plain
//! vector indexed by slot.

use crate::config::SwitchConfig;
use crate::error::{OffloadError, OffloadResult};
use crate::types::{Key, Location, RegisterId, Transaction};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Clone, Debug)]
pub struct Layout {
    num_stages: usize,
    regs_per_stage: usize,
    slots_per_reg: usize,
    forward: FxHashMap<Key, Location>,
    /// flat register index -> slot -> key
    backward: Vec<Vec<Key>>,
    frequencies: FxHashMap<Key, u64>,
}

impl Layout {
    /// Empty layout over the register space described by `config`
    pub fn new(config: &SwitchConfig) -> OffloadResult<Self> {
        config.validate()?;
        Ok(Self {
            num_stages: config.num_stages,
            regs_per_stage: config.regs_per_stage,
            slots_per_reg: config.slots_per_reg,
            forward: FxHashMap::default(),
            backward: vec![Vec::new(); config.num_registers()],
            frequencies: FxHashMap::default(),
        })
    }

    /// Place `key` in the next free slot of `reg`
    pub fn place(&mut self, key: Key, reg: RegisterId) -> OffloadResult<Location> {
        if self.forward.contains_key(&key) {
            return Err(OffloadError::KeyAlreadyPlaced(key));
        }
        if reg.stage >= self.num_stages || reg.register >= self.regs_per_stage {
            return Err(OffloadError::LocationOutOfRange {
                stage: reg.stage,
                register: reg.register,
                slot: 0,
            });
        }
        let slots = &mut self.backward[reg.flat(self.regs_per_stage)];
        if slots.len() >= self.slots_per_reg {
            return Err(OffloadError::RegisterFull {
                stage: reg.stage,
                register: reg.register,
            });
        }

        let loc = Location::new(reg.stage, reg.register, slots.len() as u32);
        slots.push(key);
        self.forward.insert(key, loc);
        Ok(loc)
    }

    pub fn set_frequency(&mut self, key: Key, count: u64) {
        self.frequencies.insert(key, count);
    }

    #[inline]
    pub fn lookup(&self, key: Key) -> Option<Location> {
        self.forward.get(&key).copied()
    }

    #[inline]
    pub fn contains(&self, key: Key) -> bool {
        self.forward.contains_key(&key)
    }

    pub fn reverse_lookup(&self, loc: Location) -> Option<Key> {
        if loc.stage >= self.num_stages || loc.register >= self.regs_per_stage {
            return None;
        }
        self.backward[loc.register_id().flat(self.regs_per_stage)]
            .get(loc.slot as usize)
            .copied()
    }

    /// Access count seen while planning; 0 for keys never counted
    #[inline]
    pub fn frequency(&self, key: Key) -> u64 {
        self.frequencies.get(&key).copied().unwrap_or(0)
    }

    /// Number of placed (hot) keys
    pub fn num_keys(&self) -> usize {
        self.forward.len()
    }

    /// Set of placed keys
    pub fn hot_keys(&self) -> FxHashSet<Key> {
        self.forward.keys().copied().collect()
    }

    /// Keys currently placed in `reg`
    pub fn occupancy(&self, reg: RegisterId) -> usize {
        self.backward
            .get(reg.flat(self.regs_per_stage))
            .map_or(0, |slots| slots.len())
    }

    #[inline]
    pub fn has_room(&self, reg: RegisterId) -> bool {
        self.occupancy(reg) < self.slots_per_reg
    }

    pub fn is_full(&self) -> bool {
        self.backward.iter().all(|s| s.len() >= self.slots_per_reg)
    }

    /// All register arrays in stage-major order
    pub fn registers(&self) -> impl Iterator<Item = RegisterId> + '_ {
        (0..self.num_stages * self.regs_per_stage)
            .map(move |flat| RegisterId::from_flat(flat, self.regs_per_stage))
    }

    pub fn num_registers(&self) -> usize {
        self.backward.len()
    }

    pub fn regs_per_stage(&self) -> usize {
        self.regs_per_stage
    }

    /// Split a raw transaction into the part served by the switch and the cold rest
    pub fn split(&self, txn: &Transaction) -> (Transaction, Transaction) {
        let (hot, cold): (Vec<_>, Vec<_>) = txn
            .accesses
            .iter()
            .copied()
            .partition(|access| self.contains(access.key));
        (Transaction::new(hot), Transaction::new(cold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> SwitchConfig {
        SwitchConfig::with_dimensions(2, 1, 2)
    }

    #[test]
    fn test_place_appends_slots() {
        let mut layout = Layout::new(&tiny_config()).unwrap();
        let a = layout.place(Key(10), RegisterId::new(0, 0)).unwrap();
        let b = layout.place(Key(11), RegisterId::new(0, 0)).unwrap();
        assert_eq!(a, Location::new(0, 0, 0));
        assert_eq!(b, Location::new(0, 0, 1));
        assert_eq!(layout.reverse_lookup(b), Some(Key(11)));
        assert_eq!(layout.lookup(Key(10)), Some(a));
        assert_eq!(layout.lookup(Key(99)), None);
        assert_eq!(layout.hot_keys(), [Key(10), Key(11)].into_iter().collect());
    }

    #[test]
    fn test_place_rejects_full_and_duplicate() {
        let mut layout = Layout::new(&tiny_config()).unwrap();
        let reg = RegisterId::new(1, 0);
        layout.place(Key(1), reg).unwrap();
        layout.place(Key(2), reg).unwrap();
        assert_eq!(
            layout.place(Key(3), reg),
            Err(OffloadError::RegisterFull {
                stage: 1,
                register: 0
            })
        );
        assert_eq!(
            layout.place(Key(1), RegisterId::new(0, 0)),
            Err(OffloadError::KeyAlreadyPlaced(Key(1)))
        );
        assert!(layout.place(Key(4), RegisterId::new(5, 0)).is_err());
    }

    #[test]
    fn test_split_hot_cold() {
        let mut layout = Layout::new(&tiny_config()).unwrap();
        layout.place(Key(1), RegisterId::new(0, 0)).unwrap();
        let (hot, cold) = layout.split(&Transaction::from_keys([1u64, 2, 3]));
        assert_eq!(hot.keys().collect::<Vec<_>>(), vec![Key(1)]);
        assert_eq!(cold.keys().collect::<Vec<_>>(), vec![Key(2), Key(3)]);
    }
}
