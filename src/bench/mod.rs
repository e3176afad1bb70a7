//! Offload Pipeline Benchmark
//!
//! Drives seeded synthetic workloads through the whole path (planner,
//! compiler, simulator, checker) and reports cycle-level throughput.

use crate::compiler::TransactionCompiler;
use crate::config::{LayoutConfig, PlacementStrategy, SwitchConfig};
use crate::error::OffloadResult;
use crate::layout::{HotBatchIter, KeyLayoutPlanner};
use crate::pipeline::{run_to_completion, DriverConfig, LockPolicy, PipelineSimulator};
use crate::types::{Access, Key, Transaction};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Synthetic workload shapes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Workload {
    /// Keys uniform over the whole key space
    Uniform,
    /// 8 keys per transaction, 90% of them from a small hot range
    Hot8,
    /// More distinct keys per transaction than register arrays: every
    /// transaction needs at least two passes
    Adversarial,
}

/// Keys in the hot range of `Workload::Hot8`
const HOT8_RANGE: u64 = 64;

#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    pub workload: Workload,
    pub num_transactions: usize,
    /// Size of the key space
    pub num_keys: u64,
    /// Keys per transaction (`Uniform` only)
    pub txn_len: usize,
    /// Transactions compiled and run together
    pub batch_size: usize,
    pub layout: LayoutConfig,
    pub policy: LockPolicy,
    pub switch: SwitchConfig,
    pub seed: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            workload: Workload::Hot8,
            num_transactions: 20_000,
            num_keys: 1_000_000,
            txn_len: 4,
            batch_size: 4096,
            layout: LayoutConfig {
                hot_fraction: 0.001,
                strategy: PlacementStrategy::FrequencyHeuristic,
            },
            policy: LockPolicy::Granular,
            switch: SwitchConfig::default(),
            seed: 0x5EED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub workload: Workload,
    pub policy: LockPolicy,
    pub total_transactions: usize,
    /// Transactions with at least one hot key
    pub offloaded: usize,
    pub hot_keys: usize,
    pub committed: usize,
    pub aborted: usize,
    pub cycles: u64,
    pub passes_per_commit: f64,
    pub lock_conflicts: u64,
    pub undo_passes: u64,
    pub wall_time_us: u64,
    pub serializable: bool,
}

impl BenchmarkResult {
    /// Committed transactions per pipeline cycle
    pub fn commits_per_cycle(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.committed as f64 / self.cycles as f64
        }
    }
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            r#"
╔══════════════════════════════════════════════════════════════╗
║                  OFFLOAD PIPELINE RESULTS                    ║
╠══════════════════════════════════════════════════════════════╣
║  Workload / Policy:     {:>14} / {:<14}        ║
║  Transactions:          {:>10}                            ║
║  Offloaded:             {:>10}                            ║
║  Hot Keys:              {:>10}                            ║
╠══════════════════════════════════════════════════════════════╣
║  Committed:             {:>10}                            ║
║  Aborted:               {:>10}                            ║
║  Cycles:                {:>10}                            ║
║  Commits / Cycle:       {:>10.3}                            ║
║  Passes / Commit:       {:>10.2}                            ║
║  Lock Conflicts:        {:>10}                            ║
║  Undo Passes:           {:>10}                            ║
╠══════════════════════════════════════════════════════════════╣
║  Wall Time:             {:>10.2} ms                        ║
║  Serializable:          {:>10}                            ║
╚══════════════════════════════════════════════════════════════╝
"#,
            format!("{:?}", self.workload),
            format!("{:?}", self.policy),
            self.total_transactions,
            self.offloaded,
            self.hot_keys,
            self.committed,
            self.aborted,
            self.cycles,
            self.commits_per_cycle(),
            self.passes_per_commit,
            self.lock_conflicts,
            self.undo_passes,
            self.wall_time_us as f64 / 1000.0,
            self.serializable,
        )
    }
}

/// Seeded transactions for `config.workload`
pub fn generate_workload(config: &BenchmarkConfig) -> Vec<Transaction> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let num_keys = config.num_keys.max(1);
    let mut txns = Vec::with_capacity(config.num_transactions);

    for _ in 0..config.num_transactions {
        let keys: Vec<u64> = match config.workload {
            Workload::Uniform => (0..config.txn_len.max(1))
                .map(|_| rng.gen_range(0..num_keys))
                .collect(),
            Workload::Hot8 => (0..8)
                .map(|_| {
                    if rng.gen_bool(0.9) {
                        rng.gen_range(0..HOT8_RANGE.min(num_keys))
                    } else {
                        rng.gen_range(0..num_keys)
                    }
                })
                .collect(),
            Workload::Adversarial => {
                let len = config.switch.num_registers() + 1;
                let pool = (2 * len).max(num_keys.min(u32::MAX as u64) as usize);
                sample(&mut rng, pool, len.min(pool))
                    .into_iter()
                    .map(|k| k as u64)
                    .collect()
            }
        };

        let accesses = keys
            .into_iter()
            .map(|k| {
                if rng.gen_bool(0.5) {
                    Access::read(Key(k))
                } else {
                    Access::write(Key(k), rng.gen())
                }
            })
            .collect();
        txns.push(Transaction::new(accesses));
    }
    txns
}

/// Run one workload end to end
pub fn run_benchmark(config: &BenchmarkConfig) -> OffloadResult<BenchmarkResult> {
    let txns = generate_workload(config);
    let start = Instant::now();

    let planner = KeyLayoutPlanner::new(config.switch.clone(), config.layout.clone())?;
    let layout = planner.build(&txns)?;
    let hot = layout.hot_keys();
    let compiler = TransactionCompiler::new(&layout, &config.switch)?;
    let mut sim = PipelineSimulator::new(config.switch.clone(), config.policy)?;
    let driver = DriverConfig::default();

    let mut offloaded = 0;
    let mut committed = 0;
    let mut aborted = 0;
    let total = txns.len();
    for batch in HotBatchIter::new(txns, &hot, config.batch_size) {
        let (mut compiled, _) = compiler.compile_batch(0, &batch)?;
        for (i, stx) in compiled.iter_mut().enumerate() {
            stx.port = i % config.switch.num_ports;
        }
        offloaded += compiled.len();

        let report = run_to_completion(&mut sim, &compiled, &driver)?;
        committed += report.committed;
        aborted += report.aborted;
    }

    let stats = sim.stats();
    Ok(BenchmarkResult {
        workload: config.workload,
        policy: config.policy,
        total_transactions: total,
        offloaded,
        hot_keys: layout.num_keys(),
        committed,
        aborted,
        cycles: stats.cycles,
        passes_per_commit: stats.passes_per_commit(),
        lock_conflicts: stats.lock_conflicts,
        undo_passes: stats.undo_passes,
        wall_time_us: start.elapsed().as_micros() as u64,
        serializable: sim.checker().is_serializable(),
    })
}

/// Same workload under every lock policy
pub fn benchmark_policies(base: &BenchmarkConfig) -> OffloadResult<Vec<BenchmarkResult>> {
    [LockPolicy::Granular, LockPolicy::Ideal, LockPolicy::WholePipeline]
        .into_iter()
        .map(|policy| {
            let config = BenchmarkConfig {
                policy,
                ..base.clone()
            };
            run_benchmark(&config)
        })
        .collect()
}
