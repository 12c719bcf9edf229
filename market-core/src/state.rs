use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

// ============================================================================
// Serializable State Snapshot for JS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct MarketSnapshot {
    pub tick: u64,
    pub agents: u32,
    pub total_money: f64,
    pub goods: Vec<GoodSnapshot>,
    pub archetypes: Vec<ArchetypeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct GoodSnapshot {
    pub id: u32,
    pub name: String,
    pub avg_price: f64,
    // Good-level band
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    // Last tick's raw volumes
    pub asks: f64,
    pub bids: f64,
    pub traded: f64,
    pub ask_ema: f64,
    pub bid_ema: f64,
    pub traded_ema: f64,
    pub scarcity: f64,
    /// Units held across all agents.
    pub held: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct ArchetypeSnapshot {
    pub id: u32,
    pub name: String,
    pub population: u32,
    pub profit_ema: f64,
    pub mean_money: f64,
}
