use rayon::prelude::*;

use crate::agents::{AgentStore, Wallet};
use crate::config::MarketConfig;
use crate::types::{AgentId, ArchetypeId, Money};

// === MONEY LEDGER ===

/// Per-row money deltas posted during clearing. Reset every tick.
#[derive(Debug, Default)]
pub struct TickLedger {
    deltas: Vec<Money>,
    traded: Vec<bool>,
}

impl TickLedger {
    pub fn reset(&mut self, rows: usize) {
        self.deltas.clear();
        self.deltas.resize(rows, 0.0);
        self.traded.clear();
        self.traded.resize(rows, false);
    }

    pub fn post(&mut self, row: usize, amount: Money) {
        if let (Some(d), Some(t)) = (self.deltas.get_mut(row), self.traded.get_mut(row)) {
            *d += amount;
            *t = true;
        }
    }

    pub fn delta(&self, row: usize) -> Money {
        self.deltas.get(row).copied().unwrap_or(0.0)
    }

    pub fn traded(&self, row: usize) -> bool {
        self.traded.get(row).copied().unwrap_or(false)
    }

    /// Sum of all posted deltas. Zero up to rounding, since every fill posts
    /// a matching credit and debit.
    pub fn net(&self) -> Money {
        self.deltas.iter().sum()
    }
}

// === SETTLEMENT ===

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bankruptcy {
    pub agent: AgentId,
    pub archetype: ArchetypeId,
    pub money: Money,
}

#[derive(Debug, Default)]
pub struct SettlementReport {
    /// Row order.
    pub bankrupt: Vec<Bankruptcy>,
    /// Mean net money change per agent of each archetype this tick.
    pub archetype_profit: Vec<Money>,
    pub population: Vec<usize>,
}

/// `sign(0) == 0`, unlike `f64::signum`.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Settle one wallet; returns the net change since the start of the tick.
pub fn settle_wallet(wallet: &mut Wallet, delta: Option<Money>, cfg: &MarketConfig) -> Money {
    // Decay follows the sign of cumulative profit, before this tick is booked
    if let Some(delta) = delta {
        wallet.money += delta;
        wallet.money *= 1.0 - cfg.profit_decay * sign(wallet.profit);
    }
    let net = wallet.money - wallet.money_last_round;
    wallet.profit += net;
    net
}

/// Settlement phase. Wallets settle in parallel; the bankruptcy queue and
/// archetype aggregates are collected in row order.
pub fn settle(
    agents: &mut AgentStore,
    ledger: &TickLedger,
    archetype_count: usize,
    cfg: &MarketConfig,
) -> SettlementReport {
    let cols = agents.columns_mut();
    let nets: Vec<Money> = cols
        .wallets
        .par_iter_mut()
        .enumerate()
        .map(|(row, wallet)| {
            let delta = ledger.traded(row).then(|| ledger.delta(row));
            settle_wallet(wallet, delta, cfg)
        })
        .collect();

    let mut report = SettlementReport {
        bankrupt: Vec::new(),
        archetype_profit: vec![0.0; archetype_count],
        population: vec![0; archetype_count],
    };

    for (row, net) in nets.into_iter().enumerate() {
        let archetype = cols.archetypes[row];
        if let (Some(p), Some(n)) = (
            report.archetype_profit.get_mut(archetype),
            report.population.get_mut(archetype),
        ) {
            *p += net;
            *n += 1;
        }

        let money = cols.wallets[row].money;
        if money <= 0.0 {
            report.bankrupt.push(Bankruptcy {
                agent: cols.handles[row],
                archetype,
                money,
            });
        }
    }

    for (p, &n) in report.archetype_profit.iter_mut().zip(&report.population) {
        if n > 0 {
            *p /= n as f64;
        }
    }

    report
}
