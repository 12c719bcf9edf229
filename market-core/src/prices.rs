//! Rolling per-agent price memory.
//!
//! Clearing appends a `PriceMemory` for both sides of every fill into the
//! agent's *pending* buffer. Nothing reads pending entries until the refresh
//! at the end of the tick merges them into the *live* buffer, so an agent
//! never observes half-written history.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::agents::AgentStore;
use crate::config::MarketConfig;
use crate::types::{GoodId, Price};

/// A trade price observed by one agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceMemory {
    pub good: GoodId,
    pub price: Price,
    pub tick: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceMemories {
    pub live: Vec<PriceMemory>,
    pub pending: Vec<PriceMemory>,
}

/// Local mean/min/max for one (agent, good).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub mean: Price,
    pub min: Price,
    pub max: Price,
    pub transactions: u32,
}

impl PriceStats {
    pub fn seeded(initial: Price, band: (f64, f64)) -> Self {
        Self {
            mean: initial,
            min: initial * band.0,
            max: initial * band.1,
            transactions: 0,
        }
    }

    /// Pull the band toward the mean so it stays responsive.
    pub fn age(&mut self, cfg: &MarketConfig) {
        self.max = (self.max * cfg.band_max_shrink).max(self.mean * cfg.band_max_floor);
        self.min = (self.min * cfg.band_min_grow).min(self.mean * cfg.band_min_cap);
        self.transactions = 0;
    }

    pub fn fold(&mut self, price: Price) {
        self.transactions += 1;
        self.mean += (price - self.mean) / self.transactions as f64;
        self.min = self.min.min(price);
        self.max = self.max.max(price);
    }

    /// Position of the mean in the band, inverted: 1.0 at the floor, 0.0 at the ceiling.
    /// `None` while the band is too narrow to say anything.
    pub fn preference(&self) -> Option<f64> {
        let band = self.max - self.min;
        if !band.is_finite() || band <= f64::EPSILON {
            return None;
        }
        Some(1.0 - ((self.mean - self.min) / band).clamp(0.0, 1.0))
    }
}

/// Fold one agent's history for this tick.
pub fn refresh_agent(
    stats: &mut [PriceStats],
    memories: &mut PriceMemories,
    tick: u64,
    cfg: &MarketConfig,
) {
    memories.live.append(&mut memories.pending);

    for s in stats.iter_mut() {
        s.age(cfg);
    }

    memories
        .live
        .retain(|m| tick.saturating_sub(m.tick) <= cfg.lookback_ticks);

    for m in &memories.live {
        if let Some(s) = stats.get_mut(m.good) {
            s.fold(m.price);
        }
    }
}

/// Refresh every agent in parallel, then fold the good-level band.
pub fn refresh_all(agents: &mut AgentStore, tick: u64, cfg: &MarketConfig) {
    let cols = agents.columns_mut();
    cols.stats
        .par_iter_mut()
        .zip(cols.memories.par_iter_mut())
        .for_each(|(stats, memories)| refresh_agent(stats, memories, tick, cfg));
}

/// Aggregate all agents' stats for `good`. Returns `None` when no agent holds any.
///
/// The mean is transaction-weighted over agents that traded inside the window;
/// if nobody did, `previous_mean` is kept.
pub fn aggregate_good(agents: &AgentStore, good: GoodId, previous_mean: Price) -> Option<PriceStats> {
    let mut weighted = 0.0;
    let mut transactions = 0u32;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for stats in agents.stats() {
        let s = stats.get(good)?;
        min = min.min(s.min);
        max = max.max(s.max);
        weighted += s.mean * s.transactions as f64;
        transactions += s.transactions;
    }

    if !min.is_finite() || !max.is_finite() {
        return None;
    }

    let mean = if transactions > 0 {
        weighted / transactions as f64
    } else {
        previous_mean
    };

    Some(PriceStats {
        mean,
        min,
        max,
        transactions,
    })
}
