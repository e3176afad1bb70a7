//! Key Layout Planner - Places Hot Keys Into Register Arrays
//!
//! Counts key frequencies over a transaction history, keeps the hottest
//! fraction, and assigns every hot key a `(stage, register, slot)` home.
//! The default strategy is a greedy min-conflict heuristic: keys are placed
//! hottest first, each into the register array holding the fewest of its
//! already-placed co-accessed keys, so keys that travel together rarely
//! share an array and rarely force extra passes.

use super::Layout;
use crate::config::{LayoutConfig, PlacementStrategy, SwitchConfig};
use crate::error::OffloadResult;
use crate::types::{Key, RegisterId, Transaction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};

/// Co-access weights: `adj[a][b]` = transactions containing both `a` and `b`
pub type Adjacency = FxHashMap<Key, FxHashMap<Key, u32>>;

/// Per-key access counts, hottest first (ties by ascending key)
pub fn count_frequencies(txns: &[Transaction]) -> Vec<(Key, u64)> {
    let mut counts: FxHashMap<Key, u64> = FxHashMap::default();
    for txn in txns {
        for key in txn.keys() {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(Key, u64)> = counts.into_iter().collect();
    sorted.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    sorted
}

/// Number of keys kept hot out of `distinct` candidates
pub fn hot_set_size(distinct: usize, hot_fraction: f64, capacity: usize) -> usize {
    if distinct == 0 {
        return 0;
    }
    let wanted = ((distinct as f64) * hot_fraction).floor() as usize;
    wanted.max(1).min(distinct).min(capacity)
}

/// The hottest keys of a history, as a set
pub fn hot_keys(txns: &[Transaction], hot_fraction: f64, capacity: usize) -> FxHashSet<Key> {
    let freqs = count_frequencies(txns);
    let n = hot_set_size(freqs.len(), hot_fraction, capacity);
    freqs.into_iter().take(n).map(|(k, _)| k).collect()
}

/// Build co-access weights restricted to `keys`
///
/// Each transaction contributes once per unordered pair of distinct keys,
/// however many times either key repeats inside it.
pub fn build_adjacency(txns: &[Transaction], keys: &FxHashSet<Key>) -> Adjacency {
    let mut adj: Adjacency = FxHashMap::default();
    let mut members: Vec<Key> = Vec::new();

    for txn in txns {
        members.clear();
        members.extend(txn.keys().filter(|k| keys.contains(k)));
        members.sort_unstable();
        members.dedup();

        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                *adj.entry(a).or_default().entry(b).or_insert(0) += 1;
                *adj.entry(b).or_default().entry(a).or_insert(0) += 1;
            }
        }
    }
    adj
}

/// Builds a `Layout` from a transaction history
pub struct KeyLayoutPlanner {
    switch: SwitchConfig,
    config: LayoutConfig,
}

impl KeyLayoutPlanner {
    pub fn new(switch: SwitchConfig, config: LayoutConfig) -> OffloadResult<Self> {
        switch.validate()?;
        config.validate()?;
        Ok(Self { switch, config })
    }

    pub fn switch_config(&self) -> &SwitchConfig {
        &self.switch
    }

    /// Plan a layout for `txns`
    ///
    /// Every counted key gets a frequency entry; only the hot set is placed.
    /// Placement never picks a full register array and stops once all of
    /// them are full.
    pub fn build(&self, txns: &[Transaction]) -> OffloadResult<Layout> {
        let mut layout = Layout::new(&self.switch)?;
        let freqs = count_frequencies(txns);
        for &(key, count) in &freqs {
            layout.set_frequency(key, count);
        }

        let n_hot = hot_set_size(
            freqs.len(),
            self.config.hot_fraction,
            self.switch.register_capacity(),
        );
        let hot: Vec<Key> = freqs.iter().take(n_hot).map(|&(k, _)| k).collect();

        match self.config.strategy {
            PlacementStrategy::FrequencyHeuristic => {
                self.place_min_conflict(&mut layout, txns, &hot)?
            }
            PlacementStrategy::NaiveSpray => self.place_naive(&mut layout, txns, &hot)?,
            PlacementStrategy::RandomSpray { seed } => {
                self.place_random(&mut layout, &hot, seed)?
            }
        }

        log::info!(
            "layout planned: {} of {} keys hot ({:?}) across {} register arrays",
            layout.num_keys(),
            freqs.len(),
            self.config.strategy,
            layout.num_registers()
        );
        Ok(layout)
    }

    fn place_min_conflict(
        &self,
        layout: &mut Layout,
        txns: &[Transaction],
        hot: &[Key],
    ) -> OffloadResult<()> {
        let hot_set: FxHashSet<Key> = hot.iter().copied().collect();
        let adj = build_adjacency(txns, &hot_set);
        let num_regs = layout.num_registers();
        let regs_per_stage = layout.regs_per_stage();
        let mut conflicts = vec![0u64; num_regs];

        for &key in hot {
            conflicts.iter_mut().for_each(|c| *c = 0);
            if let Some(neighbours) = adj.get(&key) {
                for neighbour in neighbours.keys() {
                    if let Some(loc) = layout.lookup(*neighbour) {
                        conflicts[loc.register_id().flat(regs_per_stage)] += 1;
                    }
                }
            }

            // Strict `<` keeps the lowest index on ties
            let mut best: Option<(usize, u64)> = None;
            for (flat, &count) in conflicts.iter().enumerate() {
                let reg = RegisterId::from_flat(flat, regs_per_stage);
                if !layout.has_room(reg) {
                    continue;
                }
                if best.map_or(true, |(_, c)| count < c) {
                    best = Some((flat, count));
                }
            }

            match best {
                Some((flat, _)) => {
                    layout.place(key, RegisterId::from_flat(flat, regs_per_stage))?;
                }
                None => break,
            }
        }
        Ok(())
    }

    fn place_naive(
        &self,
        layout: &mut Layout,
        txns: &[Transaction],
        hot: &[Key],
    ) -> OffloadResult<()> {
        let hot_set: FxHashSet<Key> = hot.iter().copied().collect();
        let num_regs = layout.num_registers();
        let regs_per_stage = layout.regs_per_stage();
        let mut next = 0usize;

        for key in txns.iter().flat_map(|t| t.keys()) {
            if !hot_set.contains(&key) || layout.contains(key) {
                continue;
            }
            if layout.is_full() {
                break;
            }
            // Slot-major round robin: every array gets slot i before any gets slot i+1
            let reg = RegisterId::from_flat(next % num_regs, regs_per_stage);
            layout.place(key, reg)?;
            next += 1;
        }
        Ok(())
    }

    fn place_random(&self, layout: &mut Layout, hot: &[Key], seed: u64) -> OffloadResult<()> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut open: Vec<RegisterId> = layout.registers().collect();

        for &key in hot {
            open.retain(|reg| layout.has_room(*reg));
            if open.is_empty() {
                break;
            }
            let reg = open[rng.gen_range(0..open.len())];
            layout.place(key, reg)?;
        }
        Ok(())
    }
}
