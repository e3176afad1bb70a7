//! Serializability Checker - Register-Write Dependency Graph
//!
//! Every register write records an edge `current -> previous writer`: the
//! current transaction observed state the previous one produced. A history
//! is serializable under this write-ordering discipline iff the graph is
//! acyclic; a depth-first post-order then lists every transaction after all
//! of its dependencies.

use crate::error::{OffloadError, OffloadResult};
use crate::types::{TxnId, START_TXN_ID};
use rustc_hash::FxHashSet;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Dependency graph over pipeline transaction ids
#[derive(Debug, Default, Clone)]
pub struct SerializabilityChecker {
    /// txn id -> ids it depends on, in first-recorded order
    dependencies: Vec<Vec<TxnId>>,
    /// Deduplicates the multigraph into a graph
    edge_set: FxHashSet<(TxnId, TxnId)>,
    /// Write events seen, duplicates included
    events: u64,
    max_id: TxnId,
}

impl SerializabilityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id` part of the history even if it never conflicts
    pub fn record_txn(&mut self, id: TxnId) {
        if id == START_TXN_ID {
            return;
        }
        self.max_id = self.max_id.max(id);
        if self.dependencies.len() <= id as usize {
            self.dependencies.resize_with(id as usize + 1, Vec::new);
        }
    }

    /// `current` overwrote a cell last written by `previous`
    ///
    /// Writes over the initial state and a transaction re-writing its own
    /// cell on a later pass add no edge.
    pub fn record_write(&mut self, current: TxnId, previous: TxnId) {
        self.events += 1;
        self.record_txn(current);
        if previous == START_TXN_ID || previous == current {
            return;
        }
        self.record_txn(previous);
        if self.edge_set.insert((current, previous)) {
            self.dependencies[current as usize].push(previous);
        }
    }

    pub fn num_edges(&self) -> usize {
        self.edge_set.len()
    }

    pub fn num_events(&self) -> u64 {
        self.events
    }

    /// Highest transaction id seen
    pub fn max_txn_id(&self) -> TxnId {
        self.max_id
    }

    pub fn dependencies_of(&self, id: TxnId) -> &[TxnId] {
        self.dependencies
            .get(id as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All distinct edges, sorted
    pub fn edges(&self) -> Vec<(TxnId, TxnId)> {
        let mut edges: Vec<_> = self.edge_set.iter().copied().collect();
        edges.sort_unstable();
        edges
    }

    /// Serial order of ids `1..=max`, dependencies first
    ///
    /// Fails with the offending cycle if the history is not serializable.
    pub fn verify(&self) -> OffloadResult<Vec<TxnId>> {
        let n = self.dependencies.len();
        let mut color = vec![Color::White; n];
        let mut order = Vec::with_capacity(n.saturating_sub(1));
        // (node, index of next dependency to visit)
        let mut stack: Vec<(TxnId, usize)> = Vec::new();

        for root in 1..n as TxnId {
            if color[root as usize] != Color::White {
                continue;
            }
            color[root as usize] = Color::Gray;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let deps = &self.dependencies[node as usize];
                if top.1 < deps.len() {
                    let dep = deps[top.1];
                    top.1 += 1;
                    match color[dep as usize] {
                        Color::White => {
                            color[dep as usize] = Color::Gray;
                            stack.push((dep, 0));
                        }
                        Color::Gray => {
                            let start = stack
                                .iter()
                                .position(|&(id, _)| id == dep)
                                .unwrap_or(0);
                            let cycle = stack[start..].iter().map(|&(id, _)| id).collect();
                            return Err(OffloadError::NotSerializable { cycle });
                        }
                        Color::Black => {}
                    }
                } else {
                    color[node as usize] = Color::Black;
                    order.push(node);
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    pub fn is_serializable(&self) -> bool {
        self.verify().is_ok()
    }

    /// Panic with the cycle if the history is not serializable
    pub fn assert_serializable(&self) {
        if let Err(err) = self.verify() {
            panic!("{}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_is_serializable() {
        let mut checker = SerializabilityChecker::new();
        checker.record_write(1, START_TXN_ID);
        checker.record_write(2, 1);
        checker.record_write(3, 2);
        checker.record_write(3, 1);

        let order = checker.verify().unwrap();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(checker.edges(), vec![(2, 1), (3, 1), (3, 2)]);
        checker.assert_serializable();
    }

    #[test]
    fn test_cycle_reported() {
        let mut checker = SerializabilityChecker::new();
        checker.record_write(1, 3);
        checker.record_write(2, 1);
        checker.record_write(3, 2);

        match checker.verify() {
            Err(OffloadError::NotSerializable { cycle }) => {
                assert_eq!(cycle.len(), 3);
                let mut sorted = cycle.clone();
                sorted.sort_unstable();
                assert_eq!(sorted, vec![1, 2, 3]);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
        assert!(!checker.is_serializable());
    }

    #[test]
    #[should_panic(expected = "Unserializable")]
    fn test_assert_panics_on_cycle() {
        let mut checker = SerializabilityChecker::new();
        checker.record_write(1, 2);
        checker.record_write(2, 1);
        checker.assert_serializable();
    }

    #[test]
    fn test_self_edges_and_duplicates_ignored() {
        let mut checker = SerializabilityChecker::new();
        checker.record_write(4, 4);
        checker.record_write(5, 4);
        checker.record_write(5, 4);
        assert_eq!(checker.num_events(), 3);
        assert_eq!(checker.num_edges(), 1);
        assert_eq!(checker.dependencies_of(5), &[4]);
        // Ids with no edges still appear in the serial order
        assert_eq!(checker.verify().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_history() {
        let checker = SerializabilityChecker::new();
        assert_eq!(checker.verify().unwrap(), Vec::<TxnId>::new());
    }
}
