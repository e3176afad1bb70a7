//! Contention-balanced lock partitioning
//!
//! A key is contended when some transaction reaches it on a second or later
//! pass of its register array. Contended keys are packed hottest first into
//! `num_locks` bins, each bin closing once its load reaches
//! `ceil(total / num_locks)`.

use crate::error::{OffloadError, OffloadResult};
use crate::layout::Layout;
use crate::types::{Key, LockSet, SoftwareTransaction, MAX_LOCKS};
use rustc_hash::FxHashMap;

/// Contended key -> lock id, plus the contended load each lock carries
#[derive(Clone, Debug, Default)]
pub struct LockPartition {
    assignment: FxHashMap<Key, usize>,
    loads: Vec<u64>,
}

impl LockPartition {
    #[inline]
    pub fn lock_of(&self, key: Key) -> Option<usize> {
        self.assignment.get(&key).copied()
    }

    /// Contended accesses covered by each lock id
    pub fn loads(&self) -> &[u64] {
        &self.loads
    }

    pub fn num_keys(&self) -> usize {
        self.assignment.len()
    }

    /// Lock ids actually in use
    pub fn num_locks_used(&self) -> usize {
        self.loads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }

    /// Lock set covering `keys`; keys without a lock contribute nothing
    pub fn locks_for<I: IntoIterator<Item = Key>>(&self, keys: I) -> LockSet {
        let mut set = LockSet::empty();
        for key in keys {
            if let Some(lock) = self.lock_of(key) {
                set.set(lock);
            }
        }
        set
    }
}

/// Partition contended keys into `num_locks` lock ids and fill in every
/// transaction's `locks_check` / `locks_want`
///
/// Fails if any access names a key with no layout entry.
pub fn assign_locks(
    layout: &Layout,
    txns: &mut [SoftwareTransaction],
    num_locks: usize,
) -> OffloadResult<LockPartition> {
    if num_locks == 0 || num_locks > MAX_LOCKS {
        return Err(OffloadError::InvalidConfig(format!(
            "num_locks must be in 1..={}, got {}",
            MAX_LOCKS, num_locks
        )));
    }

    let mut counts: FxHashMap<Key, u64> = FxHashMap::default();
    for txn in txns.iter() {
        for access in &txn.accesses {
            if !layout.contains(access.key) {
                return Err(OffloadError::ColdKey(access.key));
            }
            if access.is_contended() {
                *counts.entry(access.key).or_insert(0) += 1;
            }
        }
    }

    let mut contended: Vec<(Key, u64)> = counts.into_iter().collect();
    contended.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let total: u64 = contended.iter().map(|(_, c)| c).sum();
    let quantum = total.div_ceil(num_locks as u64);

    let mut partition = LockPartition::default();
    let mut load = 0u64;
    for (key, count) in contended {
        if partition.loads.is_empty() || load >= quantum {
            partition.loads.push(0);
            load = 0;
        }
        let lock = partition.loads.len() - 1;
        if lock >= num_locks {
            return Err(OffloadError::LockPartitionOverflow {
                needed: lock + 1,
                available: num_locks,
            });
        }
        partition.assignment.insert(key, lock);
        partition.loads[lock] += count;
        load += count;
    }

    for txn in txns.iter_mut() {
        txn.locks_check = partition.locks_for(txn.accesses.iter().map(|a| a.key));
        txn.locks_want = partition.locks_for(txn.contended().map(|a| a.key));
        txn.locks_undo.clear();
        debug_assert!(txn.locks_check.is_superset(txn.locks_want));
        debug_assert!(txn.locks_want.len() <= txn.contended().count());
    }

    log::debug!(
        "lock partition: {} contended keys, quantum {}, loads {:?}",
        partition.num_keys(),
        quantum,
        partition.loads
    );
    Ok(partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::TransactionCompiler;
    use crate::config::SwitchConfig;
    use crate::types::{RegisterId, Transaction};

    /// One register array per stage; keys 0..8 all in stage 0, 100.. in stage 1
    fn fixture() -> (Layout, SwitchConfig) {
        let mut config = SwitchConfig::with_dimensions(2, 1, 16);
        config.num_locks = 2;
        let mut layout = Layout::new(&config).unwrap();
        for k in 0..8u64 {
            layout.place(Key(k), RegisterId::new(0, 0)).unwrap();
            layout.set_frequency(Key(k), 100 - k);
        }
        layout.place(Key(100), RegisterId::new(1, 0)).unwrap();
        (layout, config)
    }

    fn compile_all(layout: &Layout, config: &SwitchConfig, txns: &[Transaction]) -> Vec<SoftwareTransaction> {
        let compiler = TransactionCompiler::new(layout, config).unwrap();
        txns.iter().map(|t| compiler.compile(0, t).unwrap()).collect()
    }

    #[test]
    fn test_every_contended_key_gets_one_lock() {
        let (layout, config) = fixture();
        let txns = vec![
            Transaction::from_keys([0u64, 1]),
            Transaction::from_keys([0u64, 2]),
            Transaction::from_keys([0u64, 2, 3, 100]),
            Transaction::from_keys([4u64, 5]),
        ];
        let mut compiled = compile_all(&layout, &config, &txns);
        let partition = assign_locks(&layout, &mut compiled, 2).unwrap();

        for stx in &compiled {
            for access in stx.contended() {
                let lock = partition.lock_of(access.key).unwrap();
                assert!(stx.locks_want.contains(lock));
            }
            assert!(stx.locks_want.len() <= stx.contended().count());
            assert!(stx.locks_check.is_superset(stx.locks_want));
        }
        // Key 0 is hottest, always pass 0, never contended
        assert_eq!(partition.lock_of(Key(0)), None);
        assert!(partition.num_locks_used() <= 2);
    }

    #[test]
    fn test_quantum_balances_load() {
        let (layout, config) = fixture();
        // Contended counts: key1 x3, key2 x2, key3 x1 -> total 6, quantum 3
        let mut txns = vec![Transaction::from_keys([0u64, 1]); 3];
        txns.extend(vec![Transaction::from_keys([0u64, 2]); 2]);
        txns.push(Transaction::from_keys([0u64, 3]));

        let mut compiled = compile_all(&layout, &config, &txns);
        let partition = assign_locks(&layout, &mut compiled, 2).unwrap();
        assert_eq!(partition.lock_of(Key(1)), Some(0));
        assert_eq!(partition.lock_of(Key(2)), Some(1));
        assert_eq!(partition.lock_of(Key(3)), Some(1));
        assert_eq!(partition.loads(), &[3, 3]);
    }

    #[test]
    fn test_no_contention_no_locks() {
        let (layout, config) = fixture();
        let mut compiled = compile_all(&layout, &config, &[Transaction::from_keys([0u64, 100])]);
        let partition = assign_locks(&layout, &mut compiled, 2).unwrap();
        assert!(partition.is_empty());
        assert!(compiled[0].locks_check.is_empty());
        assert!(compiled[0].locks_want.is_empty());
    }

    #[test]
    fn test_cold_key_fails_batch() {
        let (layout, config) = fixture();
        let mut compiled = compile_all(&layout, &config, &[Transaction::from_keys([0u64, 1])]);
        compiled[0].accesses[1].key = Key(999);
        assert_eq!(
            assign_locks(&layout, &mut compiled, 2).unwrap_err(),
            OffloadError::ColdKey(Key(999))
        );
    }
}
