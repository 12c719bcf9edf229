use wasm_bindgen::prelude::*;

pub mod agents;
pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod market;
pub mod prices;
pub mod production;
pub mod replacement;
pub mod state;
pub mod types;
pub mod world;

#[cfg(feature = "instrument")]
pub use instrument;

pub use agents::{AgentStore, AgentView, InvSlot, Inventory, Wallet};
pub use catalog::{Archetype, Catalog, CatalogDef, DeltaEntry, GoodDef, Recipe};
pub use config::{BidSizing, MarketConfig, UnsoldAskDecay};
pub use error::{CatalogError, SimError};
pub use history::MarketHistory;
pub use replacement::{ReplacementChoice, ReplacementReason};
pub use state::*;
pub use types::*;
pub use world::{TickReport, World};

// ============================================================================
// WASM API - Simulation
// ============================================================================

fn js_error(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

#[wasm_bindgen]
pub struct Simulation {
    world: World,
}

#[wasm_bindgen]
impl Simulation {
    /// Create a simulation from a catalog definition with default tunables.
    #[wasm_bindgen(constructor)]
    pub fn new(catalog_json: &str) -> Result<Simulation, JsError> {
        Self::from_catalog_json(catalog_json, None)
    }

    /// Create a simulation from a catalog definition and an optional
    /// `MarketConfig` JSON object; missing config fields keep their defaults.
    #[wasm_bindgen]
    pub fn from_catalog_json(
        catalog_json: &str,
        config_json: Option<String>,
    ) -> Result<Simulation, JsError> {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();

        let cfg = match config_json {
            Some(json) => serde_json::from_str::<MarketConfig>(&json).map_err(js_error)?,
            None => MarketConfig::default(),
        };
        let world = World::from_json(catalog_json, cfg).map_err(js_error)?;
        Ok(Self { world })
    }

    /// Spawn `count` agents of the named archetype. Returns how many were created.
    #[wasm_bindgen]
    pub fn spawn(&mut self, archetype: &str, count: u32, money: f64) -> Result<u32, JsError> {
        let spawned = self
            .world
            .spawn_named(archetype, count as usize, money)
            .map_err(js_error)?;
        Ok(spawned.len() as u32)
    }

    /// Advance the simulation by one tick
    #[wasm_bindgen]
    pub fn advance_tick(&mut self) {
        self.world.advance_tick();
    }

    #[wasm_bindgen]
    pub fn advance(&mut self, ticks: u32) {
        self.world.run(ticks as u64);
    }

    #[wasm_bindgen]
    pub fn get_tick(&self) -> u64 {
        self.world.tick
    }

    #[wasm_bindgen]
    pub fn get_snapshot(&self) -> MarketSnapshot {
        self.world.snapshot()
    }

    /// Full time series of every good and archetype.
    #[wasm_bindgen]
    pub fn get_history(&self) -> Result<JsValue, JsError> {
        serde_wasm_bindgen::to_value(self.world.history()).map_err(js_error)
    }

    /// Average-price series of one good, starting with its initial price.
    #[wasm_bindgen]
    pub fn price_series(&self, good: usize) -> js_sys::Float64Array {
        js_sys::Float64Array::from(self.world.history().prices(good))
    }
}
