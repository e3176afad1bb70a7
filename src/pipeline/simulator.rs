//! Pipeline Simulator - Cycle-Level Model of the Switch Ingress
//!
//! Ports feed per-group input buffers (IPBs); each IPB feeds one parser;
//! one parser per cycle admits its packet into stage 0, recirculation
//! first, otherwise the group with the fullest IPB. A packet leaving the
//! last stage either completes, is ejected as aborted, or recirculates.
//!
//! Register operations for a stage run when its occupant leaves the stage,
//! so every cell write is ordered against the writes of the packets ahead
//! of it. Each write records `current -> previous writer` with the
//! serializability checker.
//!
//! The model is single-threaded and deterministic: the same sequence of
//! `send`/`run_cycle`/`recv` calls always produces the same outcomes.

use super::lock_protocol::{LockDecision, LockPolicy, LockTable};
use super::slot_pool::{SlotId, SlotPool};
use super::stats::SimulatorStats;
use crate::config::SwitchConfig;
use crate::error::{OffloadError, OffloadResult};
use crate::types::{Location, RegisterId, SoftwareTransaction, TxnId, START_TXN_ID};
use crate::verify::SerializabilityChecker;
use std::collections::VecDeque;

/// Outcome reported by `recv`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    pub id: TxnId,
    /// false when the transaction ran out of lock retries
    pub committed: bool,
}

#[derive(Debug)]
struct InFlight {
    id: TxnId,
    txn: SoftwareTransaction,
    /// Whether this pass does register work
    valid: bool,
}

/// Last-writer id of every register cell, allocated on first touch
#[derive(Debug)]
struct RegisterFile {
    regs_per_stage: usize,
    cells: Vec<Vec<TxnId>>,
}

impl RegisterFile {
    fn new(config: &SwitchConfig) -> Self {
        Self {
            regs_per_stage: config.regs_per_stage,
            cells: vec![Vec::new(); config.num_registers()],
        }
    }

    /// Make `id` the cell's writer and return the one it replaced
    fn write(&mut self, reg: RegisterId, slot: u32, id: TxnId) -> TxnId {
        let cells = &mut self.cells[reg.flat(self.regs_per_stage)];
        let slot = slot as usize;
        if cells.len() <= slot {
            cells.resize(slot + 1, START_TXN_ID);
        }
        std::mem::replace(&mut cells[slot], id)
    }

    fn last_writer(&self, loc: Location) -> TxnId {
        self.cells
            .get(loc.register_id().flat(self.regs_per_stage))
            .and_then(|cells| cells.get(loc.slot as usize))
            .copied()
            .unwrap_or(START_TXN_ID)
    }
}

pub struct PipelineSimulator {
    config: SwitchConfig,
    pool: SlotPool<InFlight>,
    /// One per port group, plus the recirculation port last
    ipbs: Vec<VecDeque<SlotId>>,
    parsers: Vec<Option<SlotId>>,
    stages: Vec<Option<SlotId>>,
    /// Per front-panel port: (committed, slot)
    egress: Vec<VecDeque<(bool, SlotId)>>,
    registers: RegisterFile,
    locks: LockTable,
    checker: SerializabilityChecker,
    next_id: TxnId,
    stats: SimulatorStats,
}

impl PipelineSimulator {
    /// Create an empty pipeline running `policy`
    pub fn new(config: SwitchConfig, policy: LockPolicy) -> OffloadResult<Self> {
        config.validate()?;
        let groups = config.num_port_groups + 1;

        Ok(Self {
            pool: SlotPool::new(config.pool_capacity),
            ipbs: (0..groups).map(|_| VecDeque::new()).collect(),
            parsers: (0..groups).map(|_| None).collect(),
            stages: (0..config.num_stages).map(|_| None).collect(),
            egress: (0..config.num_ports).map(|_| VecDeque::new()).collect(),
            registers: RegisterFile::new(&config),
            locks: LockTable::new(policy),
            checker: SerializabilityChecker::new(),
            next_id: START_TXN_ID + 1,
            stats: SimulatorStats::default(),
            config,
        })
    }

    /// Queue `txn` on its port's input buffer
    ///
    /// Returns the assigned id, or `None` if the buffer is full and the
    /// caller must retry later. The transaction is copied; its in-flight
    /// protocol state starts fresh.
    pub fn send(&mut self, txn: &SoftwareTransaction) -> OffloadResult<Option<TxnId>> {
        self.check_port(txn.port)?;
        if txn.passes.is_empty() {
            return Err(OffloadError::EmptyTransaction);
        }
        let cells = txn
            .passes
            .iter()
            .flat_map(|grid| grid.iter())
            .map(|(reg, slot)| Location::new(reg.stage, reg.register, slot));
        for loc in txn.locations().chain(cells) {
            self.check_location(loc)?;
        }

        let group = self.config.port_group(txn.port);
        if self.ipbs[group].len() >= self.config.ipb_capacity {
            self.stats.backpressured += 1;
            return Ok(None);
        }

        let mut copy = txn.clone();
        copy.reset_progress();
        let id = self.next_id;
        let slot = self.pool.checkout(InFlight {
            id,
            txn: copy,
            valid: true,
        })?;
        self.next_id += 1;

        self.ipbs[group].push_back(slot);
        self.checker.record_txn(id);
        self.stats.sent += 1;
        Ok(Some(id))
    }

    /// Whether `port`'s input buffer holds at least `threshold` of its capacity
    pub fn is_almost_full(&self, port: usize, threshold: f64) -> OffloadResult<bool> {
        self.check_port(port)?;
        let len = self.ipbs[self.config.port_group(port)].len();
        Ok(len as f64 >= self.config.ipb_capacity as f64 * threshold)
    }

    /// Packets waiting in `port`'s input buffer
    pub fn ipb_len(&self, port: usize) -> OffloadResult<usize> {
        self.check_port(port)?;
        Ok(self.ipbs[self.config.port_group(port)].len())
    }

    /// Advance the pipeline by one clock
    pub fn run_cycle(&mut self) -> OffloadResult<()> {
        self.stats.cycles += 1;
        let last = self.config.num_stages - 1;

        self.run_register_ops(last)?;
        if let Some(slot) = self.stages[last].take() {
            self.retire(slot)?;
        }

        for stage in (1..=last).rev() {
            self.run_register_ops(stage - 1)?;
            self.stages[stage] = self.stages[stage - 1].take();
        }

        if let Some(group) = self.pick_parser() {
            if let Some(slot) = self.parsers[group].take() {
                self.admit(&slot)?;
                self.stages[0] = Some(slot);
                self.refill_parser(group);
            }
        }

        for group in 0..self.parsers.len() {
            if self.parsers[group].is_none() {
                self.refill_parser(group);
            }
        }
        Ok(())
    }

    /// Pop the oldest finished transaction on `port` and free its slot
    pub fn recv(&mut self, port: usize) -> OffloadResult<Option<Completion>> {
        self.check_port(port)?;
        let Some((committed, slot)) = self.egress[port].pop_front() else {
            return Ok(None);
        };
        let entry = self.pool.release(slot)?;
        Ok(Some(Completion {
            id: entry.id,
            committed,
        }))
    }

    /// Transactions holding a pool slot, finished-but-unreceived included
    pub fn in_flight(&self) -> usize {
        self.pool.in_use()
    }

    /// No transaction holds a slot
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    /// Dependency graph recorded so far
    pub fn checker(&self) -> &SerializabilityChecker {
        &self.checker
    }

    /// Counters since construction
    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    /// Current global lock state
    pub fn lock_table(&self) -> &LockTable {
        &self.locks
    }

    /// Hardware dimensions this pipeline was built with
    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    /// Last transaction to touch the cell at `loc`, `START_TXN_ID` if none
    pub fn last_writer(&self, loc: Location) -> TxnId {
        self.registers.last_writer(loc)
    }

    /// Register ops index the register file directly; reject anything outside it
    fn check_location(&self, loc: Location) -> OffloadResult<()> {
        if loc.stage >= self.config.num_stages
            || loc.register >= self.config.regs_per_stage
            || loc.slot as usize >= self.config.slots_per_reg
        {
            return Err(OffloadError::LocationOutOfRange {
                stage: loc.stage,
                register: loc.register,
                slot: loc.slot,
            });
        }
        Ok(())
    }

    fn check_port(&self, port: usize) -> OffloadResult<()> {
        if port >= self.config.num_ports {
            return Err(OffloadError::InvalidPort(port));
        }
        Ok(())
    }

    fn run_register_ops(&mut self, stage: usize) -> OffloadResult<()> {
        let Some(slot) = self.stages[stage].as_ref() else {
            return Ok(());
        };
        let entry = self.pool.get(slot)?;
        if !entry.valid {
            return Ok(());
        }
        let Some(grid) = entry.txn.current_pass() else {
            return Ok(());
        };

        for (reg, cell) in grid.stage_cells(stage) {
            let previous = self.registers.write(reg, cell, entry.id);
            self.checker.record_write(entry.id, previous);
            self.stats.register_ops += 1;
        }
        Ok(())
    }

    /// Route a packet leaving the last stage
    fn retire(&mut self, slot: SlotId) -> OffloadResult<()> {
        let entry = self.pool.get_mut(&slot)?;
        if entry.valid {
            entry.txn.pass_cursor += 1;
        }
        self.stats.passes += 1;

        let txn = &entry.txn;
        if txn.is_complete() {
            self.stats.committed += 1;
            self.egress[txn.port].push_back((true, slot));
        } else if txn.is_first_pass()
            && txn.fail_count >= self.config.max_fail_count
            && txn.locks_undo.is_empty()
        {
            log::debug!(
                "txn {} aborted after {} failed lock attempts",
                entry.id,
                txn.fail_count
            );
            self.stats.aborted += 1;
            self.egress[txn.port].push_back((false, slot));
        } else {
            entry.valid = true;
            self.stats.recirculations += 1;
            self.ipbs[self.config.recirc_port()].push_back(slot);
        }
        Ok(())
    }

    /// Recirculation first, else the ready parser with the fullest IPB (lowest group on ties)
    fn pick_parser(&self) -> Option<usize> {
        let recirc = self.config.recirc_port();
        if self.parsers[recirc].is_some() {
            return Some(recirc);
        }

        let mut best: Option<(usize, usize)> = None;
        for group in 0..self.config.num_port_groups {
            if self.parsers[group].is_none() {
                continue;
            }
            let len = self.ipbs[group].len();
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((group, len));
            }
        }
        best.map(|(group, _)| group)
    }

    fn admit(&mut self, slot: &SlotId) -> OffloadResult<()> {
        let entry = self.pool.get_mut(slot)?;
        let decision = self.locks.admit(entry.id, &mut entry.txn);
        entry.valid = decision.is_valid();

        match decision {
            LockDecision::Conflict => self.stats.lock_conflicts += 1,
            LockDecision::Undone => self.stats.undo_passes += 1,
            _ => {}
        }
        Ok(())
    }

    fn refill_parser(&mut self, group: usize) {
        if let Some(slot) = self.ipbs[group].pop_front() {
            self.parsers[group] = Some(slot);
        }
    }
}
