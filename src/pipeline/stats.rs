use serde::Serialize;
use std::fmt;

/// Counters accumulated by a `PipelineSimulator`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SimulatorStats {
    /// Clock cycles run
    pub cycles: u64,
    /// Transactions admitted by `send`
    pub sent: u64,
    /// `send` calls refused for a full input buffer
    pub backpressured: u64,
    /// Transactions that finished every pass
    pub committed: u64,
    /// Transactions ejected after exhausting their retry budget
    pub aborted: u64,
    /// Pipeline traversals, valid or not
    pub passes: u64,
    /// Register cells read or written
    pub register_ops: u64,
    /// Failed first-pass lock attempts
    pub lock_conflicts: u64,
    /// Passes spent giving back provisional locks
    pub undo_passes: u64,
    /// Transactions pushed to the recirculation port
    pub recirculations: u64,
}

impl SimulatorStats {
    /// Pipeline traversals per committed transaction
    pub fn passes_per_commit(&self) -> f64 {
        if self.committed == 0 {
            0.0
        } else {
            self.passes as f64 / self.committed as f64
        }
    }

    pub fn abort_rate(&self) -> f64 {
        let done = self.committed + self.aborted;
        if done == 0 {
            0.0
        } else {
            self.aborted as f64 / done as f64
        }
    }
}

impl fmt::Display for SimulatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Cycles:            {}", self.cycles)?;
        writeln!(f, "  Sent:              {} ({} backpressured)", self.sent, self.backpressured)?;
        writeln!(f, "  Committed:         {}", self.committed)?;
        writeln!(f, "  Aborted:           {} ({:.2}%)", self.aborted, self.abort_rate() * 100.0)?;
        writeln!(f, "  Passes:            {} ({:.2}/commit)", self.passes, self.passes_per_commit())?;
        writeln!(f, "  Register ops:      {}", self.register_ops)?;
        writeln!(f, "  Lock conflicts:    {}", self.lock_conflicts)?;
        writeln!(f, "  Undo passes:       {}", self.undo_passes)?;
        write!(f, "  Recirculations:    {}", self.recirculations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios_handle_zero() {
        let stats = SimulatorStats::default();
        assert_eq!(stats.passes_per_commit(), 0.0);
        assert_eq!(stats.abort_rate(), 0.0);

        let stats = SimulatorStats {
            committed: 3,
            aborted: 1,
            passes: 6,
            ..Default::default()
        };
        assert_eq!(stats.passes_per_commit(), 2.0);
        assert_eq!(stats.abort_rate(), 0.25);
        assert!(stats.to_string().contains("Committed:         3"));
    }
}
