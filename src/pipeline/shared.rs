//! Mutex-serialized handle to one simulator
//!
//! Lets feeder threads call `send` while a driver thread runs cycles; every
//! call takes the same lock, so the simulator still sees one strict sequence.

use super::simulator::{Completion, PipelineSimulator};
use crate::error::OffloadResult;
use crate::types::{SoftwareTransaction, TxnId};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone)]
pub struct SharedSimulator {
    inner: Arc<Mutex<PipelineSimulator>>,
}

impl SharedSimulator {
    pub fn new(sim: PipelineSimulator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sim)),
        }
    }

    pub fn send(&self, txn: &SoftwareTransaction) -> OffloadResult<Option<TxnId>> {
        self.inner.lock().send(txn)
    }

    pub fn is_almost_full(&self, port: usize, threshold: f64) -> OffloadResult<bool> {
        self.inner.lock().is_almost_full(port, threshold)
    }

    pub fn run_cycle(&self) -> OffloadResult<()> {
        self.inner.lock().run_cycle()
    }

    pub fn recv(&self, port: usize) -> OffloadResult<Option<Completion>> {
        self.inner.lock().recv(port)
    }

    /// Run `f` with exclusive access, for multi-call sequences that must not interleave
    pub fn with<R>(&self, f: impl FnOnce(&mut PipelineSimulator) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwitchConfig;
    use crate::pipeline::LockPolicy;
    use crate::types::{AccessMode, CompiledAccess, Key, LockSet, Location, PassGrid, RegisterId};
    use std::thread;

    fn txn(port: usize, slot: u32) -> SoftwareTransaction {
        let mut grid = PassGrid::new();
        grid.insert(RegisterId::new(0, 0), slot);
        SoftwareTransaction {
            port,
            accesses: vec![CompiledAccess {
                key: Key(slot as u64),
                location: Location::new(0, 0, slot),
                mode: AccessMode::Write,
                value: 0,
                pass: 0,
            }],
            passes: vec![grid],
            locks_check: LockSet::empty(),
            locks_want: LockSet::empty(),
            locks_undo: LockSet::empty(),
            fail_count: 0,
            pass_cursor: 0,
        }
    }

    #[test]
    fn test_feeders_and_driver_share_one_simulator() {
        let sim = PipelineSimulator::new(SwitchConfig::with_dimensions(2, 1, 64), LockPolicy::Granular)
            .unwrap();
        let shared = SharedSimulator::new(sim);

        let feeders: Vec<_> = (0..4usize)
            .map(|f| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..8u32 {
                        let mut sent = shared.send(&txn(f * 4, f as u32 * 8 + i)).unwrap();
                        while sent.is_none() {
                            thread::yield_now();
                            sent = shared.send(&txn(f * 4, f as u32 * 8 + i)).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in feeders {
            handle.join().unwrap();
        }

        let mut done = 0;
        for _ in 0..1000 {
            shared.run_cycle().unwrap();
            for port in [0, 4, 8, 12] {
                while shared.recv(port).unwrap().is_some() {
                    done += 1;
                }
            }
        }
        assert_eq!(done, 32);
        assert!(shared.with(|sim| sim.is_idle()));
        shared.with(|sim| sim.checker().assert_serializable());
    }
}
