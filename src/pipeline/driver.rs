//! Closed-loop driver: feed, clock and drain a simulator until every
//! submitted transaction has been reported.

use super::simulator::{Completion, PipelineSimulator};
use crate::error::{OffloadError, OffloadResult};
use crate::types::SoftwareTransaction;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Hold off sending while the target IPB is at least this full
    pub backoff_threshold: f64,
    /// Give up after this many cycles
    pub max_cycles: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            backoff_threshold: 0.8,
            max_cycles: 10_000_000,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunReport {
    /// In the order `recv` returned them
    pub completions: Vec<Completion>,
    pub cycles: u64,
    pub committed: usize,
    pub aborted: usize,
}

/// Send `txns` in order, at most one per cycle, then run until all are back
pub fn run_to_completion(
    sim: &mut PipelineSimulator,
    txns: &[SoftwareTransaction],
    driver: &DriverConfig,
) -> OffloadResult<RunReport> {
    let num_ports = sim.config().num_ports;
    let mut report = RunReport::default();
    let mut next = 0usize;

    while report.completions.len() < txns.len() {
        if report.cycles >= driver.max_cycles {
            return Err(OffloadError::CycleBudgetExceeded(driver.max_cycles));
        }

        if let Some(txn) = txns.get(next) {
            if !sim.is_almost_full(txn.port, driver.backoff_threshold)? && sim.send(txn)?.is_some() {
                next += 1;
            }
        }

        sim.run_cycle()?;
        report.cycles += 1;

        for port in 0..num_ports {
            while let Some(done) = sim.recv(port)? {
                if done.committed {
                    report.committed += 1;
                } else {
                    report.aborted += 1;
                }
                report.completions.push(done);
            }
        }
    }

    log::info!(
        "run finished: {} committed, {} aborted in {} cycles",
        report.committed,
        report.aborted,
        report.cycles
    );
    Ok(report)
}
