use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::agents::{AgentStore, InvSlot};
use crate::config::{MarketConfig, UnsoldAskDecay};
use crate::prices::PriceMemory;
use crate::types::{AgentId, GoodId, Money, Price, Quantity, good_rng};

use super::orders::{Offer, OfferBook};
use super::settlement::TickLedger;

// === FILLS ===

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fill {
    pub good: GoodId,
    pub seller: AgentId,
    pub buyer: AgentId,
    pub quantity: Quantity,
    /// Always the matched ask's price.
    pub price: Price,
}

/// Everything clearing one good wants to write, keyed by store row.
///
/// Built from a read-only view of the store; `apply` merges it afterwards.
/// Within one good an agent has at most one offer, so rows in `slots` are
/// unique.
#[derive(Debug, Default)]
pub struct GoodClearing {
    pub good: GoodId,
    pub fills: Vec<Fill>,
    pub slots: Vec<(usize, InvSlot)>,
    pub deltas: Vec<(usize, Money)>,
    pub memories: Vec<(usize, PriceMemory)>,
    pub ask_volume: Quantity,
    pub bid_volume: Quantity,
    pub traded_volume: Quantity,
    pub traded_value: Money,
}

impl GoodClearing {
    /// Write slots, pending price memories and money deltas back.
    pub fn apply(&self, agents: &mut AgentStore, ledger: &mut TickLedger) {
        {
            let inventories = agents.inventories_mut();
            for &(row, slot) in &self.slots {
                if let Some(target) = inventories.get_mut(row).and_then(|i| i.slot_mut(self.good)) {
                    *target = InvSlot {
                        quantity: slot.quantity.max(0.0),
                        ..slot
                    };
                }
            }
        }

        let cols = agents.columns_mut();
        for &(row, memory) in &self.memories {
            if let Some(m) = cols.memories.get_mut(row) {
                m.pending.push(memory);
            }
        }

        for &(row, delta) in &self.deltas {
            ledger.post(row, delta);
        }
    }
}

// === SINGLE GOOD CLEARING ===

struct Working {
    offer: Offer,
    remaining: Quantity,
    slot: InvSlot,
    touched: bool,
}

fn unsold_factor(decay: UnsoldAskDecay, remaining: Quantity) -> f64 {
    match decay {
        UnsoldAskDecay::Disabled => 1.0,
        UnsoldAskDecay::Sqrt { rate, floor } => (1.0 - rate * remaining.sqrt()).max(floor),
    }
}

/// Clear one good: cheapest ask against the next bid in random order, at the
/// ask's price, until either side runs out.
pub fn clear_good(
    good: GoodId,
    asks: &[Offer],
    bids: &[Offer],
    agents: &AgentStore,
    cfg: &MarketConfig,
    tick: u64,
) -> GoodClearing {
    let mut out = GoodClearing {
        good,
        ask_volume: asks.iter().map(|o| o.units).sum(),
        bid_volume: bids.iter().map(|o| o.units).sum(),
        ..Default::default()
    };

    let working = |offer: &Offer| Working {
        offer: *offer,
        remaining: offer.units,
        slot: agents
            .inventories()
            .get(offer.row)
            .map(|i| i.slot(good))
            .unwrap_or_default(),
        touched: false,
    };

    // Stable sort: equal prices keep queue order
    let mut sellers: Vec<Working> = asks.iter().map(working).collect();
    sellers.sort_by(|a, b| a.offer.price.total_cmp(&b.offer.price));

    let mut buyers: Vec<Working> = bids.iter().map(working).collect();
    let mut rng = good_rng(cfg.seed, tick, good);
    buyers.shuffle(&mut rng);

    let (mut s, mut b) = (0, 0);
    while s < sellers.len() && b < buyers.len() {
        let seller = &mut sellers[s];
        let buyer = &mut buyers[b];
        let quantity = seller.remaining.min(buyer.remaining);
        let price = seller.offer.price;

        if quantity > 0.0 {
            // Seller drifts toward the clearing price, weighted by what it kept
            let kept = (seller.slot.quantity - quantity).max(0.0);
            let old = seller.slot.recorded_price;
            seller.slot.recorded_price = (kept * old + quantity * price) / (kept + quantity);
            seller.slot.quantity = kept;
            seller.touched = true;

            // Buyer adopts it outright
            buyer.slot.quantity += quantity;
            buyer.slot.recorded_price = price;
            buyer.touched = true;

            let value = price * quantity;
            out.deltas.push((seller.offer.row, value));
            out.deltas.push((buyer.offer.row, -value));
            for row in [seller.offer.row, buyer.offer.row] {
                out.memories.push((row, PriceMemory { good, price, tick }));
            }
            out.fills.push(Fill {
                good,
                seller: seller.offer.agent,
                buyer: buyer.offer.agent,
                quantity,
                price,
            });
            out.traded_volume += quantity;
            out.traded_value += value;
        }

        seller.remaining -= quantity;
        buyer.remaining -= quantity;
        if seller.remaining <= 0.0 {
            s += 1;
        }
        if buyer.remaining <= 0.0 {
            b += 1;
        }
    }

    // Unsold surplus depresses the seller's expectation
    for seller in sellers.iter_mut().skip(s) {
        if seller.remaining <= 0.0 {
            continue;
        }
        let factor = unsold_factor(cfg.unsold_decay, seller.remaining);
        if factor != 1.0 {
            seller.slot.recorded_price =
                (seller.slot.recorded_price * factor).max(cfg.min_ask_price);
            seller.touched = true;
        }
    }

    out.slots = sellers
        .iter()
        .chain(&buyers)
        .filter(|w| w.touched)
        .map(|w| (w.offer.row, w.slot))
        .collect();

    out
}

/// Clearing phase: goods in parallel, results in good order.
pub fn clear_all(
    book: &OfferBook,
    agents: &AgentStore,
    cfg: &MarketConfig,
    tick: u64,
) -> Vec<GoodClearing> {
    (0..book.good_count())
        .into_par_iter()
        .map(|good| clear_good(good, book.asks(good), book.bids(good), agents, cfg, tick))
        .collect()
}
