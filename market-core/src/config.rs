use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::types::{Money, Price};

/// How a buyer sizes its bid for a good it is short of.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BidSizing {
    /// Bid a uniformly random multiple of the shortage.
    RandomMultiplier { low: f64, high: f64 },
    /// Bid more when the good's mean price sits near the bottom of its band.
    /// Falls back to `RandomMultiplier { 0.5, 1.5 }` while the band is degenerate.
    PricePreference,
}

/// What happens to a seller's recorded price when its ask goes unfilled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnsoldAskDecay {
    Disabled,
    /// `price *= max(1 - rate * sqrt(unsold), floor)`
    Sqrt { rate: f64, floor: f64 },
}

/// Tunables for one market run. Defaults reproduce the reference economy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub seed: u64,
    /// 0 = use the global rayon pool.
    pub worker_threads: usize,

    // Offers
    pub ask_markup: f64,
    pub min_ask_price: Price,
    pub max_ask_price: Price,
    pub bid_sizing: BidSizing,

    // Clearing
    pub volume_smoothing: f64,
    pub unsold_decay: UnsoldAskDecay,

    // Settlement
    pub profit_decay: f64,

    // Price tracker
    pub lookback_ticks: u64,
    pub band_max_shrink: f64,
    pub band_max_floor: f64,
    pub band_min_grow: f64,
    pub band_min_cap: f64,
    /// Initial stats band around a good's starting price, as (low, high) multipliers.
    pub seed_band: (f64, f64),

    // Replacement
    pub scarcity_threshold: f64,
    pub neutral_scarcity: f64,
    pub negligible_volume: f64,
    pub respawn_money: Money,
    pub profit_smoothing: f64,

    /// Smoothing of the per-agent "last recipe run" diagnostic.
    pub recipe_smoothing: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            worker_threads: 0,
            ask_markup: 1.02,
            min_ask_price: 0.005,
            max_ask_price: 5.0,
            bid_sizing: BidSizing::PricePreference,
            volume_smoothing: 0.75,
            unsold_decay: UnsoldAskDecay::Sqrt {
                rate: 0.01,
                floor: 0.5,
            },
            profit_decay: 0.005,
            lookback_ticks: 5,
            band_max_shrink: 0.9,
            band_max_floor: 1.1,
            band_min_grow: 1.1,
            band_min_cap: 0.95,
            seed_band: (0.5, 1.5),
            scarcity_threshold: 1.5,
            neutral_scarcity: 1.0,
            negligible_volume: 1e-6,
            respawn_money: 100.0,
            profit_smoothing: 0.9,
            recipe_smoothing: 0.9,
        }
    }
}

impl MarketConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_bid_sizing(mut self, bid_sizing: BidSizing) -> Self {
        self.bid_sizing = bid_sizing;
        self
    }

    pub fn with_unsold_decay(mut self, unsold_decay: UnsoldAskDecay) -> Self {
        self.unsold_decay = unsold_decay;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Reject tunables that would make a tick misbehave: unordered or
    /// non-finite price bands, smoothing factors outside [0, 1], bad bid
    /// multipliers or negative decay rates.
    pub fn validate(&self) -> Result<(), SimError> {
        let fail = |field: &'static str, reason: &'static str| {
            Err(SimError::Config { field, reason })
        };
        let unit = |x: f64| (0.0..=1.0).contains(&x);
        let positive = |x: f64| x.is_finite() && x > 0.0;

        if !positive(self.ask_markup) {
            return fail("ask_markup", "must be finite and positive");
        }
        if !(positive(self.min_ask_price) && positive(self.max_ask_price)) {
            return fail("min_ask_price", "ask price band must be finite and positive");
        }
        if self.min_ask_price > self.max_ask_price {
            return fail("min_ask_price", "must not exceed max_ask_price");
        }
        if let BidSizing::RandomMultiplier { low, high } = self.bid_sizing {
            if !(low.is_finite() && high.is_finite() && 0.0 <= low && low <= high) {
                return fail("bid_sizing", "multipliers must be finite with 0 <= low <= high");
            }
        }
        if let UnsoldAskDecay::Sqrt { rate, floor } = self.unsold_decay {
            if !(rate.is_finite() && rate >= 0.0) {
                return fail("unsold_decay", "rate must be finite and non-negative");
            }
            if !unit(floor) {
                return fail("unsold_decay", "floor must lie in [0, 1]");
            }
        }
        for (field, value) in [
            ("volume_smoothing", self.volume_smoothing),
            ("profit_smoothing", self.profit_smoothing),
            ("recipe_smoothing", self.recipe_smoothing),
            ("profit_decay", self.profit_decay),
        ] {
            if !unit(value) {
                return fail(field, "must lie in [0, 1]");
            }
        }
        for (field, value) in [
            ("band_max_shrink", self.band_max_shrink),
            ("band_max_floor", self.band_max_floor),
            ("band_min_grow", self.band_min_grow),
            ("band_min_cap", self.band_min_cap),
        ] {
            if !positive(value) {
                return fail(field, "must be finite and positive");
            }
        }
        let (low, high) = self.seed_band;
        if !(positive(low) && positive(high) && low <= high) {
            return fail("seed_band", "must be finite and positive with low <= high");
        }
        if !(self.scarcity_threshold.is_finite() && self.neutral_scarcity.is_finite()) {
            return fail("scarcity_threshold", "scarcity ratios must be finite");
        }
        if !(self.negligible_volume.is_finite() && self.negligible_volume >= 0.0) {
            return fail("negligible_volume", "must be finite and non-negative");
        }
        if !positive(self.respawn_money) {
            return fail("respawn_money", "must be finite and positive");
        }
        Ok(())
    }

    /// Blend `sample` into `ema` with the configured volume smoothing.
    pub fn smooth_volume(&self, ema: f64, sample: f64) -> f64 {
        self.volume_smoothing * ema + (1.0 - self.volume_smoothing) * sample
    }

    pub fn clamp_ask(&self, price: Price) -> Price {
        price.clamp(self.min_ask_price, self.max_ask_price)
    }
}
