//! Transaction Compiler - Raw Transactions to Pipeline Passes
//!
//! A pipeline traversal visits every register array at most once, so a
//! transaction with `n` accesses in the same array needs `n` passes. The
//! compiler groups accesses by array, orders each group hottest first, and
//! hands out pass indices by position inside the group.

use super::locks::{assign_locks, LockPartition};
use crate::config::SwitchConfig;
use crate::error::{OffloadError, OffloadResult};
use crate::layout::Layout;
use crate::types::{CompiledAccess, LockSet, PassGrid, SoftwareTransaction, Transaction};
use rayon::prelude::*;
use std::cmp::Reverse;

/// Compiles transactions against one immutable layout
pub struct TransactionCompiler<'a> {
    layout: &'a Layout,
    num_locks: usize,
}

impl<'a> TransactionCompiler<'a> {
    pub fn new(layout: &'a Layout, config: &SwitchConfig) -> OffloadResult<Self> {
        config.validate()?;
        Ok(Self {
            layout,
            num_locks: config.num_locks,
        })
    }

    pub fn layout(&self) -> &Layout {
        self.layout
    }

    /// Compile one hot transaction for ingress `port`
    ///
    /// Every key must have a layout entry; cold keys are filtered upstream.
    /// Lock sets are left empty until `assign_locks` runs over the batch.
    pub fn compile(&self, port: usize, txn: &Transaction) -> OffloadResult<SoftwareTransaction> {
        if txn.is_empty() {
            return Err(OffloadError::EmptyTransaction);
        }

        let mut accesses = Vec::with_capacity(txn.len());
        for access in &txn.accesses {
            let location = self
                .layout
                .lookup(access.key)
                .ok_or(OffloadError::ColdKey(access.key))?;
            accesses.push(CompiledAccess {
                key: access.key,
                location,
                mode: access.mode,
                value: access.value,
                pass: 0,
            });
        }

        // Stable: equal-frequency accesses keep their submission order
        accesses.sort_by_key(|a| (a.location.register_id(), Reverse(self.layout.frequency(a.key))));

        let mut passes: Vec<PassGrid> = Vec::new();
        let mut run = 0usize;
        for i in 0..accesses.len() {
            if i > 0 && accesses[i].location.same_register(&accesses[i - 1].location) {
                run += 1;
            } else {
                run = 0;
            }
            accesses[i].pass = run;

            if passes.len() <= run {
                passes.resize_with(run + 1, PassGrid::new);
            }
            let inserted = passes[run].insert(accesses[i].location.register_id(), accesses[i].location.slot);
            debug_assert!(inserted, "pass {} visits a register twice", run);
        }

        Ok(SoftwareTransaction {
            port,
            accesses,
            passes,
            locks_check: LockSet::empty(),
            locks_want: LockSet::empty(),
            locks_undo: LockSet::empty(),
            fail_count: 0,
            pass_cursor: 0,
        })
    }

    /// Compile a window of transactions and partition their contended keys into locks
    ///
    /// Compilation runs in parallel; output order matches input order.
    pub fn compile_batch(
        &self,
        port: usize,
        txns: &[Transaction],
    ) -> OffloadResult<(Vec<SoftwareTransaction>, LockPartition)> {
        let mut compiled = txns
            .par_iter()
            .map(|txn| self.compile(port, txn))
            .collect::<OffloadResult<Vec<_>>>()?;

        let partition = assign_locks(self.layout, &mut compiled, self.num_locks)?;

        log::debug!(
            "compiled {} txns: {} passes total, {} contended keys over {} locks",
            compiled.len(),
            compiled.iter().map(|t| t.num_passes()).sum::<usize>(),
            partition.num_keys(),
            self.num_locks
        );
        Ok((compiled, partition))
    }
}
