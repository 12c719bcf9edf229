use rand::Rng;
use rayon::prelude::*;

use crate::agents::{AgentStore, Inventory};
use crate::catalog::{Archetype, Catalog};
use crate::config::{BidSizing, MarketConfig};
use crate::prices::PriceStats;
use crate::types::{AgentId, GoodId, Price, Quantity, offer_rng};

// === OFFERS ===

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Ask,
    Bid,
}

/// One agent's offer on one good. Bids always carry price 0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Offer {
    pub agent: AgentId,
    /// Store row of `agent`, valid for the tick the offer was made in.
    pub row: usize,
    pub good: GoodId,
    pub side: Side,
    pub units: Quantity,
    pub price: Price,
}

/// Per-good ask and bid queues, cleared every tick.
#[derive(Debug, Default)]
pub struct OfferBook {
    asks: Vec<Vec<Offer>>,
    bids: Vec<Vec<Offer>>,
}

impl OfferBook {
    pub fn new(good_count: usize) -> Self {
        Self {
            asks: vec![Vec::new(); good_count],
            bids: vec![Vec::new(); good_count],
        }
    }

    pub fn good_count(&self) -> usize {
        self.asks.len()
    }

    /// Drop every offer, keeping allocations.
    pub fn clear(&mut self) {
        self.asks.iter_mut().for_each(Vec::clear);
        self.bids.iter_mut().for_each(Vec::clear);
    }

    pub fn push(&mut self, offer: Offer) {
        let queue = match offer.side {
            Side::Ask => self.asks.get_mut(offer.good),
            Side::Bid => self.bids.get_mut(offer.good),
        };
        if let Some(queue) = queue {
            queue.push(offer);
        }
    }

    pub fn asks(&self, good: GoodId) -> &[Offer] {
        self.asks.get(good).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bids(&self, good: GoodId) -> &[Offer] {
        self.bids.get(good).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.asks.iter().chain(&self.bids).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// === OFFER GENERATION ===

fn random_multiplier<R: Rng>(rng: &mut R, low: f64, high: f64) -> f64 {
    if low < high {
        rng.random_range(low..high)
    } else {
        low
    }
}

/// Bid size for a `shortage` of one good.
pub fn bid_units<R: Rng>(
    shortage: Quantity,
    band: &PriceStats,
    sizing: BidSizing,
    rng: &mut R,
) -> Quantity {
    match sizing {
        BidSizing::RandomMultiplier { low, high } => random_multiplier(rng, low, high) * shortage,
        BidSizing::PricePreference => match band.preference() {
            Some(preference) => (preference * shortage).clamp(shortage.min(1.0), shortage),
            None => random_multiplier(rng, 0.5, 1.5) * shortage,
        },
    }
}

/// Surplus goods become asks for the whole holding, the rest become bids.
pub fn agent_offers<R: Rng>(
    id: AgentId,
    row: usize,
    archetype: &Archetype,
    inventory: &Inventory,
    bands: &[PriceStats],
    cfg: &MarketConfig,
    rng: &mut R,
) -> Vec<Offer> {
    let mut offers = Vec::new();

    for (good, (slot, band)) in inventory.slots().iter().zip(bands).enumerate() {
        let ideal = archetype.ideal.get(good).copied().unwrap_or(0.0);

        let (side, units, price) = if slot.quantity > ideal {
            (
                Side::Ask,
                slot.quantity,
                cfg.clamp_ask(slot.recorded_price * cfg.ask_markup),
            )
        } else {
            let shortage = ideal - slot.quantity;
            (Side::Bid, bid_units(shortage, band, cfg.bid_sizing, rng), 0.0)
        };

        if units > 0.0 && units.is_finite() {
            offers.push(Offer {
                agent: id,
                row,
                good,
                side,
                units,
                price,
            });
        }
    }

    offers
}

/// Offer generation phase. Agents are evaluated in parallel, then queued in
/// row order so the book is identical for any thread count.
pub fn generate_offers(
    agents: &AgentStore,
    catalog: &Catalog,
    bands: &[PriceStats],
    cfg: &MarketConfig,
    tick: u64,
    book: &mut OfferBook,
) {
    book.clear();

    let per_agent: Vec<Vec<Offer>> = agents
        .handles()
        .par_iter()
        .zip(agents.archetypes().par_iter())
        .zip(agents.inventories().par_iter())
        .enumerate()
        .map(|(row, ((&id, &archetype), inventory))| {
            let Some(archetype) = catalog.archetype(archetype) else {
                return Vec::new();
            };
            let mut rng = offer_rng(cfg.seed, tick, id);
            agent_offers(id, row, archetype, inventory, bands, cfg, &mut rng)
        })
        .collect();

    for offer in per_agent.into_iter().flatten() {
        book.push(offer);
    }
}
