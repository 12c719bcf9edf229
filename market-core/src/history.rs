// Observability time series, one sample per tick

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::catalog::Catalog;
use crate::market::GoodMarket;
use crate::types::{ArchetypeId, GoodId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct GoodSeries {
    pub name: String,
    /// Starts with the good's initial price.
    pub prices: Vec<f64>,
    pub asks: Vec<f64>,
    pub bids: Vec<f64>,
    pub trades: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct ArchetypeSeries {
    pub name: String,
    pub profit: Vec<f64>,
    pub population: Vec<u32>,
}

/// Write-only from the simulation's point of view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct MarketHistory {
    pub goods: Vec<GoodSeries>,
    pub archetypes: Vec<ArchetypeSeries>,
}

impl MarketHistory {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            goods: catalog
                .goods()
                .iter()
                .map(|g| GoodSeries {
                    name: g.name.clone(),
                    prices: vec![g.initial_price],
                    ..Default::default()
                })
                .collect(),
            archetypes: catalog
                .archetypes()
                .iter()
                .map(|a| ArchetypeSeries {
                    name: a.name.clone(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    pub fn record_good(&mut self, good: GoodId, market: &GoodMarket) {
        if let Some(series) = self.goods.get_mut(good) {
            series.prices.push(market.avg_price);
            series.asks.push(market.ask_ema);
            series.bids.push(market.bid_ema);
            series.trades.push(market.traded_ema);
        }
    }

    pub fn record_archetype(&mut self, archetype: ArchetypeId, profit_ema: f64, population: usize) {
        if let Some(series) = self.archetypes.get_mut(archetype) {
            series.profit.push(profit_ema);
            series.population.push(population as u32);
        }
    }

    pub fn prices(&self, good: GoodId) -> &[f64] {
        self.goods.get(good).map(|s| s.prices.as_slice()).unwrap_or(&[])
    }

    /// Ticks recorded so far.
    pub fn len(&self) -> usize {
        self.goods.first().map_or(0, |s| s.asks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
