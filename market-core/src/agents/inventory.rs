// Inventory and wallet types owned by a single agent

use serde::{Deserialize, Serialize};

use crate::catalog::{Archetype, GoodDef};
use crate::types::{GoodId, Money, Price, Quantity};

// === INVENTORY ===

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InvSlot {
    pub quantity: Quantity,
    /// Price the agent believes it paid for what it holds.
    pub recorded_price: Price,
}

/// One slot per good, indexed by `GoodId`. Quantities never go below zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Inventory {
    slots: Vec<InvSlot>,
}

impl Inventory {
    pub fn new(goods: &[GoodDef]) -> Self {
        Self {
            slots: goods
                .iter()
                .map(|g| InvSlot {
                    quantity: 0.0,
                    recorded_price: g.initial_price,
                })
                .collect(),
        }
    }

    /// The archetype's starting inventory at the goods' initial prices.
    pub fn starting(goods: &[GoodDef], archetype: &Archetype) -> Self {
        let mut inv = Self::new(goods);
        for (slot, &qty) in inv.slots.iter_mut().zip(&archetype.start) {
            slot.quantity = qty.max(0.0);
        }
        inv
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[InvSlot] {
        &self.slots
    }

    pub fn slot(&self, good: GoodId) -> InvSlot {
        self.slots.get(good).copied().unwrap_or_default()
    }

    pub fn slot_mut(&mut self, good: GoodId) -> Option<&mut InvSlot> {
        self.slots.get_mut(good)
    }

    pub fn get(&self, good: GoodId) -> Quantity {
        self.slot(good).quantity
    }

    /// Write a quantity, clamping at zero from below.
    pub fn set(&mut self, good: GoodId, quantity: Quantity) {
        if let Some(slot) = self.slots.get_mut(good) {
            slot.quantity = quantity.max(0.0);
        }
    }

    pub fn add(&mut self, good: GoodId, amount: Quantity) {
        let current = self.get(good);
        self.set(good, current + amount);
    }

    /// Remove up to `amount`, returning what was actually removed.
    pub fn remove(&mut self, good: GoodId, amount: Quantity) -> Quantity {
        let current = self.get(good);
        let removed = amount.clamp(0.0, current);
        self.set(good, current - removed);
        removed
    }

    pub fn total(&self) -> Quantity {
        self.slots.iter().map(|s| s.quantity).sum()
    }
}

// === WALLET ===

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wallet {
    pub money: Money,
    /// Money at the start of the current tick.
    pub money_last_round: Money,
    pub profit: Money,
}

impl Wallet {
    pub fn new(money: Money) -> Self {
        Self {
            money,
            money_last_round: money,
            profit: 0.0,
        }
    }
}

// === AGENT FLAGS ===

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AgentState {
    /// Set when upkeep could not be met or a production limit was reached.
    pub skipping: bool,
    /// Smoothed index of the last recipe run. Diagnostic only.
    pub recipe_ema: f64,
}
