use super::{Key, LockSet, Location, RegisterId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Pipeline-wide transaction id. Id 0 is the "nobody wrote this cell yet" writer.
pub type TxnId = u64;

/// Writer id stored in a register cell before any transaction touched it
pub const START_TXN_ID: TxnId = 0;

/// Register opcode, numbered as on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccessMode {
    Read = 1,
    Write = 2,
}

impl AccessMode {
    pub fn from_u8(op: u8) -> Option<Self> {
        match op {
            1 => Some(AccessMode::Read),
            2 => Some(AccessMode::Write),
            _ => None,
        }
    }
}

/// A single key access of a raw transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub key: Key,
    pub mode: AccessMode,
    /// Payload word carried to the register (write value or read placeholder)
    pub value: u32,
}

impl Access {
    pub fn read(key: Key) -> Self {
        Self {
            key,
            mode: AccessMode::Read,
            value: 0,
        }
    }

    pub fn write(key: Key, value: u32) -> Self {
        Self {
            key,
            mode: AccessMode::Write,
            value,
        }
    }
}

/// Raw transaction as produced by the workload source: an ordered list of accesses
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub accesses: Vec<Access>,
}

impl Transaction {
    pub fn new(accesses: Vec<Access>) -> Self {
        Self { accesses }
    }

    /// All-write transaction over `keys`, payload 0
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self {
            accesses: keys
                .into_iter()
                .map(|k| Access::write(k.into(), 0))
                .collect(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.accesses.iter().map(|a| a.key)
    }

    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }
}

/// Register cells one pipeline traversal touches: sparse `register -> slot` table
///
/// Kept sorted by register so iteration follows pipeline order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassGrid {
    cells: SmallVec<[(RegisterId, u32); 8]>,
}

impl PassGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell. Returns false if this pass already visits `reg`.
    pub fn insert(&mut self, reg: RegisterId, slot: u32) -> bool {
        match self.cells.binary_search_by_key(&reg, |(r, _)| *r) {
            Ok(_) => false,
            Err(pos) => {
                self.cells.insert(pos, (reg, slot));
                true
            }
        }
    }

    #[inline]
    pub fn get(&self, reg: RegisterId) -> Option<u32> {
        self.cells
            .binary_search_by_key(&reg, |(r, _)| *r)
            .ok()
            .map(|pos| self.cells[pos].1)
    }

    /// Cells belonging to one stage
    pub fn stage_cells(&self, stage: usize) -> impl Iterator<Item = (RegisterId, u32)> + '_ {
        self.cells
            .iter()
            .copied()
            .filter(move |(r, _)| r.stage == stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegisterId, u32)> + '_ {
        self.cells.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// One access after placement: where it lives and which pass services it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompiledAccess {
    pub key: Key,
    pub location: Location,
    pub mode: AccessMode,
    pub value: u32,
    pub pass: usize,
}

impl CompiledAccess {
    /// Second-or-later occurrence in its register group; needs a conflict lock
    #[inline]
    pub fn is_contended(&self) -> bool {
        self.pass > 0
    }
}

/// Transaction compiled against a layout, ready for the pipeline
///
/// `accesses` is sorted by register, then by descending key frequency.
/// `locks_undo`, `fail_count` and `pass_cursor` are protocol state mutated
/// while the transaction is in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftwareTransaction {
    /// Ingress port the transaction arrives on and leaves from
    pub port: usize,
    pub accesses: Vec<CompiledAccess>,
    pub passes: Vec<PassGrid>,
    pub locks_check: LockSet,
    pub locks_want: LockSet,
    pub locks_undo: LockSet,
    pub fail_count: u32,
    pub pass_cursor: usize,
}

impl SoftwareTransaction {
    pub fn num_passes(&self) -> usize {
        self.passes.len()
    }

    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.accesses.iter().map(|a| a.location)
    }

    /// Accesses serviced on a later pass than the first one in their register
    pub fn contended(&self) -> impl Iterator<Item = &CompiledAccess> + '_ {
        self.accesses.iter().filter(|a| a.is_contended())
    }

    #[inline]
    pub fn is_first_pass(&self) -> bool {
        self.pass_cursor == 0
    }

    #[inline]
    pub fn is_last_pass(&self) -> bool {
        self.pass_cursor + 1 == self.passes.len()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.pass_cursor >= self.passes.len()
    }

    #[inline]
    pub fn current_pass(&self) -> Option<&PassGrid> {
        self.passes.get(self.pass_cursor)
    }

    /// Forget in-flight protocol state so the transaction can be resubmitted
    pub fn reset_progress(&mut self) {
        self.locks_undo.clear();
        self.fail_count = 0;
        self.pass_cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_grid_sorted_and_unique() {
        let mut grid = PassGrid::new();
        assert!(grid.insert(RegisterId::new(2, 0), 7));
        assert!(grid.insert(RegisterId::new(0, 1), 3));
        assert!(!grid.insert(RegisterId::new(2, 0), 9));

        let regs: Vec<_> = grid.iter().map(|(r, _)| r).collect();
        assert_eq!(regs, vec![RegisterId::new(0, 1), RegisterId::new(2, 0)]);
        assert_eq!(grid.get(RegisterId::new(2, 0)), Some(7));
        assert_eq!(grid.get(RegisterId::new(1, 0)), None);
        assert_eq!(grid.stage_cells(2).count(), 1);
    }

    #[test]
    fn test_from_keys_builds_writes() {
        let txn = Transaction::from_keys([4u64, 9]);
        assert_eq!(txn.len(), 2);
        assert!(txn.accesses.iter().all(|a| a.mode == AccessMode::Write));
        assert_eq!(txn.keys().collect::<Vec<_>>(), vec![Key(4), Key(9)]);
    }

    #[test]
    fn test_access_mode_codes() {
        assert_eq!(AccessMode::from_u8(1), Some(AccessMode::Read));
        assert_eq!(AccessMode::from_u8(2), Some(AccessMode::Write));
        assert_eq!(AccessMode::from_u8(0), None);
        assert_eq!(AccessMode::Write as u8, 2);
    }
}
