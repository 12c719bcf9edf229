use serde::{Deserialize, Serialize};

use crate::config::MarketConfig;
use crate::prices::PriceStats;
use crate::types::{Price, Quantity};

/// Market-wide state of one good, carried across ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodMarket {
    pub ask_ema: Quantity,
    pub bid_ema: Quantity,
    pub traded_ema: Quantity,
    /// Value-weighted average price of the last tick that traded.
    pub avg_price: Price,
    // Raw volumes of the last tick
    pub asks: Quantity,
    pub bids: Quantity,
    pub traded: Quantity,
    /// Good-level band folded from every agent's rolling stats.
    pub band: PriceStats,
}

impl GoodMarket {
    pub fn new(initial_price: Price, cfg: &MarketConfig) -> Self {
        Self {
            ask_ema: 0.0,
            bid_ema: 0.0,
            traded_ema: 0.0,
            avg_price: initial_price,
            asks: 0.0,
            bids: 0.0,
            traded: 0.0,
            band: PriceStats::seeded(initial_price, cfg.seed_band),
        }
    }

    /// Fold one tick of volumes into the smoothed history.
    pub fn record(
        &mut self,
        asks: Quantity,
        bids: Quantity,
        traded: Quantity,
        traded_value: f64,
        cfg: &MarketConfig,
    ) {
        self.asks = asks;
        self.bids = bids;
        self.traded = traded;
        self.ask_ema = cfg.smooth_volume(self.ask_ema, asks);
        self.bid_ema = cfg.smooth_volume(self.bid_ema, bids);
        self.traded_ema = cfg.smooth_volume(self.traded_ema, traded);
        if traded > 0.0 {
            self.avg_price = traded_value / traded;
        }
    }

    /// Smoothed bid/ask ratio. Neutral while ask volume is negligible.
    pub fn scarcity(&self, cfg: &MarketConfig) -> f64 {
        if self.ask_ema < cfg.negligible_volume {
            return cfg.neutral_scarcity;
        }
        let ratio = self.bid_ema / self.ask_ema;
        if ratio.is_finite() {
            ratio
        } else {
            cfg.neutral_scarcity
        }
    }
}
