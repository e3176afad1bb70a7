//! Lock Protocol - Admission Decisions at Stage 0
//!
//! The switch has no atomic multi-register compare-and-swap, so the
//! granular policy acquires optimistically: it ORs `locks_want` into the
//! global set, then checks whether any bit of `locks_check` was already
//! held. On conflict the bits it newly set are recorded in `locks_undo` and
//! released on a dedicated undo pass before the transaction retries.
//!
//! | pass    | undo pending | action                         | valid |
//! |---------|--------------|--------------------------------|-------|
//! | first   | no           | acquire; conflict sets undo    | y / n |
//! | first   | yes          | release undo bits              | n     |
//! | last    | -            | release `locks_want`           | y     |
//! | interior| -            | nothing                        | y     |

use crate::types::{LockSet, SoftwareTransaction, TxnId};
use serde::{Deserialize, Serialize};

/// Which locking discipline the pipeline runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockPolicy {
    /// Optimistic acquire with explicit undo pass
    #[default]
    Granular,
    /// Atomic check-then-acquire; a lower bound the hardware cannot reach
    Ideal,
    /// One multi-pass transaction in the pipeline at a time
    WholePipeline,
}

/// Outcome of one admission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockDecision {
    /// First pass, locks taken
    Acquired,
    /// First pass, a needed lock is held elsewhere
    Conflict,
    /// Undo pass: provisional bits given back
    Undone,
    /// Last pass, locks given back
    Released,
    /// Interior pass, or nothing to lock
    PassThrough,
}

impl LockDecision {
    /// Whether the transaction does register work on this pass
    #[inline]
    pub fn is_valid(self) -> bool {
        matches!(
            self,
            LockDecision::Acquired | LockDecision::Released | LockDecision::PassThrough
        )
    }
}

/// Pipeline-wide lock state, owned by one simulator
#[derive(Debug, Default)]
pub struct LockTable {
    policy: LockPolicy,
    held: LockSet,
    pipe_holder: Option<TxnId>,
}

impl LockTable {
    /// Create a lock table with no locks held
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            policy,
            held: LockSet::empty(),
            pipe_holder: None,
        }
    }

    /// Locking discipline in force
    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Globally held lock ids
    pub fn held(&self) -> LockSet {
        self.held
    }

    /// Transaction owning the pipeline under `WholePipeline`
    pub fn pipe_holder(&self) -> Option<TxnId> {
        self.pipe_holder
    }

    /// Decide admission of `txn` (pipeline id `id`) into stage 0
    ///
    /// Every rejection charges the transaction one failure against its
    /// retry budget.
    pub fn admit(&mut self, id: TxnId, txn: &mut SoftwareTransaction) -> LockDecision {
        log::trace!(
            "txn {} pass {} fail {} | held {:?} check {:?} want {:?} undo {:?}",
            id,
            txn.pass_cursor,
            txn.fail_count,
            self.held,
            txn.locks_check,
            txn.locks_want,
            txn.locks_undo
        );

        let decision = match self.policy {
            LockPolicy::Granular => self.granular(txn),
            LockPolicy::Ideal => self.ideal(txn),
            LockPolicy::WholePipeline => self.whole_pipeline(id, txn),
        };
        if decision == LockDecision::Conflict {
            txn.fail_count += 1;
        }

        log::trace!("txn {} pass {} -> {:?}", id, txn.pass_cursor, decision);
        decision
    }

    fn granular(&mut self, txn: &mut SoftwareTransaction) -> LockDecision {
        if txn.is_first_pass() {
            if txn.locks_undo.is_empty() {
                let before = self.held;
                self.held.union_inplace(txn.locks_want);
                if !before.intersects(txn.locks_check) {
                    debug_assert!(!before.intersects(txn.locks_want));
                    LockDecision::Acquired
                } else {
                    txn.locks_undo = txn.locks_want.difference(before);
                    LockDecision::Conflict
                }
            } else {
                debug_assert!(self.held.is_superset(txn.locks_undo));
                self.held.remove_all(txn.locks_undo);
                txn.locks_undo.clear();
                LockDecision::Undone
            }
        } else if txn.is_last_pass() {
            self.release_want(txn)
        } else {
            LockDecision::PassThrough
        }
    }

    fn ideal(&mut self, txn: &mut SoftwareTransaction) -> LockDecision {
        if txn.is_first_pass() {
            if self.held.intersects(txn.locks_check) {
                LockDecision::Conflict
            } else {
                debug_assert!(!self.held.intersects(txn.locks_want));
                self.held.union_inplace(txn.locks_want);
                LockDecision::Acquired
            }
        } else if txn.is_last_pass() {
            self.release_want(txn)
        } else {
            LockDecision::PassThrough
        }
    }

    fn whole_pipeline(&mut self, id: TxnId, txn: &SoftwareTransaction) -> LockDecision {
        match self.pipe_holder {
            None => {
                if txn.num_passes() >= 2 {
                    self.pipe_holder = Some(id);
                    LockDecision::Acquired
                } else {
                    LockDecision::PassThrough
                }
            }
            Some(holder) if holder == id => {
                if txn.is_last_pass() {
                    self.pipe_holder = None;
                    LockDecision::Released
                } else {
                    LockDecision::PassThrough
                }
            }
            Some(_) => LockDecision::Conflict,
        }
    }

    fn release_want(&mut self, txn: &SoftwareTransaction) -> LockDecision {
        debug_assert!(
            self.held.is_superset(txn.locks_want),
            "releasing locks that are not held"
        );
        self.held.remove_all(txn.locks_want);
        LockDecision::Released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PassGrid;

    fn txn(passes: usize, check: u32, want: u32) -> SoftwareTransaction {
        SoftwareTransaction {
            port: 0,
            accesses: Vec::new(),
            passes: vec![PassGrid::new(); passes],
            locks_check: LockSet::from_bits(check),
            locks_want: LockSet::from_bits(want),
            locks_undo: LockSet::empty(),
            fail_count: 0,
            pass_cursor: 0,
        }
    }

    #[test]
    fn test_granular_acquire_then_release() {
        let mut table = LockTable::new(LockPolicy::Granular);
        let mut t = txn(2, 0b01, 0b01);

        assert_eq!(table.admit(1, &mut t), LockDecision::Acquired);
        assert_eq!(table.held().bits(), 0b01);

        t.pass_cursor = 1;
        assert_eq!(table.admit(1, &mut t), LockDecision::Released);
        assert!(table.held().is_empty());
        assert_eq!(t.fail_count, 0);
    }

    #[test]
    fn test_granular_conflict_records_undo_then_undoes() {
        let mut table = LockTable::new(LockPolicy::Granular);
        let mut holder = txn(2, 0b001, 0b001);
        assert_eq!(table.admit(1, &mut holder), LockDecision::Acquired);

        // Wants lock 2 (free) and checks lock 0 (held)
        let mut t = txn(2, 0b101, 0b100);
        assert_eq!(table.admit(2, &mut t), LockDecision::Conflict);
        assert_eq!(t.fail_count, 1);
        assert_eq!(t.locks_undo.bits(), 0b100);
        // Provisional bit is visible until undone
        assert_eq!(table.held().bits(), 0b101);

        assert_eq!(table.admit(2, &mut t), LockDecision::Undone);
        assert!(t.locks_undo.is_empty());
        assert_eq!(table.held().bits(), 0b001);
        assert_eq!(t.fail_count, 1);
    }

    #[test]
    fn test_granular_conflict_on_already_held_wants_nothing_to_undo() {
        let mut table = LockTable::new(LockPolicy::Granular);
        let mut holder = txn(2, 0b1, 0b1);
        table.admit(1, &mut holder);

        let mut t = txn(2, 0b1, 0b1);
        assert_eq!(table.admit(2, &mut t), LockDecision::Conflict);
        assert!(t.locks_undo.is_empty());
        assert_eq!(table.held().bits(), 0b1);
    }

    #[test]
    fn test_interior_pass_passes_through() {
        let mut table = LockTable::new(LockPolicy::Granular);
        let mut t = txn(3, 0b1, 0b1);
        table.admit(1, &mut t);
        t.pass_cursor = 1;
        assert_eq!(table.admit(1, &mut t), LockDecision::PassThrough);
        assert_eq!(table.held().bits(), 0b1);
    }

    #[test]
    fn test_ideal_never_sets_on_conflict() {
        let mut table = LockTable::new(LockPolicy::Ideal);
        let mut a = txn(2, 0b10, 0b10);
        let mut b = txn(2, 0b11, 0b01);
        assert_eq!(table.admit(1, &mut a), LockDecision::Acquired);
        assert_eq!(table.admit(2, &mut b), LockDecision::Conflict);
        assert_eq!(table.held().bits(), 0b10);
        assert!(b.locks_undo.is_empty());
        assert_eq!(b.fail_count, 1);
    }

    #[test]
    fn test_whole_pipeline_single_holder() {
        let mut table = LockTable::new(LockPolicy::WholePipeline);
        let mut multi = txn(2, 0, 0);
        let mut single = txn(1, 0, 0);

        assert_eq!(table.admit(1, &mut multi), LockDecision::Acquired);
        assert_eq!(table.pipe_holder(), Some(1));
        assert_eq!(table.admit(2, &mut single), LockDecision::Conflict);

        multi.pass_cursor = 1;
        assert_eq!(table.admit(1, &mut multi), LockDecision::Released);
        assert_eq!(table.pipe_holder(), None);
        assert_eq!(table.admit(2, &mut single), LockDecision::PassThrough);
    }

    #[test]
    fn test_decision_validity() {
        assert!(LockDecision::Acquired.is_valid());
        assert!(LockDecision::Released.is_valid());
        assert!(LockDecision::PassThrough.is_valid());
        assert!(!LockDecision::Conflict.is_valid());
        assert!(!LockDecision::Undone.is_valid());
    }
}
