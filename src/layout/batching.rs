//! Hot/cold splitting of a transaction stream into bounded batches

use crate::types::{Key, Transaction};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Yields batches of hot parts, at most `max_batch` per batch
///
/// Transactions whose hot part is empty are skipped. Every non-empty cold
/// part drained so far, skipped or not, is kept until `take_cold` hands it
/// to the caller for routing elsewhere.
pub struct HotBatchIter {
    pending: VecDeque<(Transaction, Transaction)>,
    cold: Vec<Transaction>,
    max_batch: usize,
    skipped: usize,
}

impl HotBatchIter {
    /// Split `txns` by membership in `hot`
    pub fn new<I>(txns: I, hot: &FxHashSet<Key>, max_batch: usize) -> Self
    where
        I: IntoIterator<Item = Transaction>,
    {
        let pending = txns
            .into_iter()
            .map(|txn| {
                let (h, c): (Vec<_>, Vec<_>) = txn
                    .accesses
                    .into_iter()
                    .partition(|a| hot.contains(&a.key));
                (Transaction::new(h), Transaction::new(c))
            })
            .collect();

        Self {
            pending,
            cold: Vec::new(),
            max_batch: max_batch.max(1),
            skipped: 0,
        }
    }

    /// Transactions dropped so far because they had no hot keys
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Drain the cold parts collected so far, in input order
    pub fn take_cold(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.cold)
    }

    /// Cold parts of every transaction not yet yielded
    pub fn remaining_cold(&self) -> impl Iterator<Item = &Transaction> + '_ {
        self.pending.iter().map(|(_, cold)| cold)
    }
}

impl Iterator for HotBatchIter {
    type Item = Vec<Transaction>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.max_batch);

        while batch.len() < self.max_batch {
            let Some((hot, cold)) = self.pending.pop_front() else {
                break;
            };
            if !cold.is_empty() {
                self.cold.push(cold);
            }
            if hot.is_empty() {
                self.skipped += 1;
                continue;
            }
            batch.push(hot);
        }

        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}
