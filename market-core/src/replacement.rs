// Bankruptcy replacement - one archetype per tick for every bankrupt agent

use serde::{Deserialize, Serialize};

use crate::agents::AgentStore;
use crate::catalog::Catalog;
use crate::config::MarketConfig;
use crate::market::{Bankruptcy, GoodMarket};
use crate::types::{AgentId, ArchetypeId, GoodId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplacementReason {
    /// Dominant producer of an under-supplied good.
    Scarce { good: GoodId, ratio: f64 },
    /// Highest smoothed profit.
    Profitable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplacementChoice {
    pub archetype: ArchetypeId,
    pub reason: ReplacementReason,
}

/// Fold this tick's mean profit into each archetype's EMA.
/// Archetypes with no living agents keep their last value.
pub fn update_profit_ema(ema: &mut [f64], sample: &[f64], population: &[usize], cfg: &MarketConfig) {
    for ((e, &s), &n) in ema.iter_mut().zip(sample).zip(population) {
        if n > 0 {
            *e = cfg.profit_smoothing * *e + (1.0 - cfg.profit_smoothing) * s;
        }
    }
}

/// Good with the highest scarcity ratio; ties go to the lowest id.
pub fn scarcest_good(markets: &[GoodMarket], cfg: &MarketConfig) -> Option<(GoodId, f64)> {
    markets
        .iter()
        .map(|m| m.scarcity(cfg))
        .enumerate()
        .fold(None, |best: Option<(GoodId, f64)>, (good, ratio)| match best {
            Some((_, r)) if r >= ratio => best,
            _ => Some((good, ratio)),
        })
}

/// Archetype with the highest profit EMA; ties go to the lowest id.
pub fn most_profitable(profit_ema: &[f64]) -> Option<ArchetypeId> {
    profit_ema
        .iter()
        .enumerate()
        .fold(None, |best: Option<(ArchetypeId, f64)>, (a, &p)| match best {
            Some((_, bp)) if bp >= p => best,
            _ => Some((a, p)),
        })
        .map(|(a, _)| a)
}

/// Produce what's scarce, otherwise what's profitable.
pub fn choose_replacement(
    catalog: &Catalog,
    markets: &[GoodMarket],
    profit_ema: &[f64],
    cfg: &MarketConfig,
) -> Option<ReplacementChoice> {
    if let Some((good, ratio)) = scarcest_good(markets, cfg) {
        if ratio > cfg.scarcity_threshold {
            if let Some(archetype) = catalog.dominant_producer(good) {
                return Some(ReplacementChoice {
                    archetype,
                    reason: ReplacementReason::Scarce { good, ratio },
                });
            }
        }
    }

    most_profitable(profit_ema).map(|archetype| ReplacementChoice {
        archetype,
        reason: ReplacementReason::Profitable,
    })
}

/// Destroy every bankrupt agent and spawn the same number of `choice`
/// agents. Returns the new handles.
pub fn replace_bankrupt(
    agents: &mut AgentStore,
    catalog: &Catalog,
    cfg: &MarketConfig,
    bankrupt: &[Bankruptcy],
    choice: ReplacementChoice,
) -> Vec<AgentId> {
    let removed = bankrupt.iter().filter(|b| agents.remove(b.agent)).count();
    (0..removed)
        .filter_map(|_| agents.spawn(catalog, cfg, choice.archetype, cfg.respawn_money))
        .collect()
}
