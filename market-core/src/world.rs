// World - the simulation context threaded through every phase of a tick

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::agents::{AgentStore, AgentView};
use crate::catalog::{Catalog, CatalogDef};
use crate::config::MarketConfig;
use crate::error::SimError;
use crate::history::MarketHistory;
use crate::market::{
    Bankruptcy, Fill, GoodMarket, OfferBook, TickLedger, clear_all, generate_offers, settle,
};
use crate::prices::{PriceStats, aggregate_good, refresh_all};
use crate::production::run_production;
use crate::replacement::{
    ReplacementChoice, choose_replacement, replace_bankrupt, update_profit_ema,
};
use crate::state::{ArchetypeSnapshot, GoodSnapshot, MarketSnapshot};
#[cfg(feature = "instrument")]
use crate::types::KeyToU64;
use crate::types::{AgentId, ArchetypeId, GoodId, Money};

/// What happened during the last tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Agents that ran a recipe.
    pub produced: usize,
    pub offers: usize,
    pub fills: Vec<Fill>,
    pub bankrupt: Vec<Bankruptcy>,
    pub spawned: Vec<AgentId>,
    pub replacement: Option<ReplacementChoice>,
}

fn in_pool<R: Send>(pool: Option<&ThreadPool>, f: impl FnOnce() -> R + Send) -> R {
    match pool {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

/// Owns the catalog, every agent and all cross-tick market state.
pub struct World {
    pub tick: u64,
    catalog: Catalog,
    cfg: MarketConfig,
    agents: AgentStore,
    markets: Vec<GoodMarket>,
    profit_ema: Vec<f64>,
    history: MarketHistory,

    // Tick-scoped buffers, drained before the next tick
    book: OfferBook,
    ledger: TickLedger,
    report: TickReport,

    /// Dedicated pool when `worker_threads > 0`, else rayon's global one.
    pool: Option<ThreadPool>,
}

impl World {
    pub fn new(catalog: Catalog, cfg: MarketConfig) -> Result<Self, SimError> {
        cfg.validate()?;

        let pool = if cfg.worker_threads > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(cfg.worker_threads)
                .build()
                .map_err(|e| SimError::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        let markets = catalog
            .goods()
            .iter()
            .map(|g| GoodMarket::new(g.initial_price, &cfg))
            .collect();

        Ok(Self {
            tick: 0,
            markets,
            profit_ema: vec![0.0; catalog.archetype_count()],
            history: MarketHistory::new(&catalog),
            book: OfferBook::new(catalog.good_count()),
            ledger: TickLedger::default(),
            report: TickReport::default(),
            agents: AgentStore::new(),
            catalog,
            cfg,
            pool,
        })
    }

    /// Build from a JSON catalog definition.
    pub fn from_json(catalog_json: &str, cfg: MarketConfig) -> Result<Self, SimError> {
        let catalog = CatalogDef::from_json(catalog_json)?.resolve()?;
        Self::new(catalog, cfg)
    }

    // === Population ===

    /// Spawn `count` agents of `archetype`, each with `money` in the wallet.
    pub fn spawn(
        &mut self,
        archetype: ArchetypeId,
        count: usize,
        money: Money,
    ) -> Result<Vec<AgentId>, SimError> {
        if self.catalog.archetype(archetype).is_none() {
            return Err(SimError::UnknownArchetype(archetype));
        }
        if !money.is_finite() {
            return Err(SimError::InvalidMoney(money));
        }
        Ok((0..count)
            .filter_map(|_| self.agents.spawn(&self.catalog, &self.cfg, archetype, money))
            .collect())
    }

    pub fn spawn_named(
        &mut self,
        archetype: &str,
        count: usize,
        money: Money,
    ) -> Result<Vec<AgentId>, SimError> {
        let id = self
            .catalog
            .archetype_by_name(archetype)
            .ok_or_else(|| SimError::UnknownArchetypeName(archetype.to_string()))?;
        self.spawn(id, count, money)
    }

    // === Accessors ===

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &MarketConfig {
        &self.cfg
    }

    pub fn agents(&self) -> &AgentStore {
        &self.agents
    }

    pub fn agent(&self, id: AgentId) -> Option<AgentView<'_>> {
        self.agents.get(id)
    }

    pub fn markets(&self) -> &[GoodMarket] {
        &self.markets
    }

    pub fn market(&self, good: GoodId) -> Option<&GoodMarket> {
        self.markets.get(good)
    }

    pub fn profit_ema(&self) -> &[f64] {
        &self.profit_ema
    }

    pub fn history(&self) -> &MarketHistory {
        &self.history
    }

    pub fn last_report(&self) -> &TickReport {
        &self.report
    }

    // === Tick ===

    /// Run one full tick: production, offers, clearing, settlement, price
    /// tracking, replacement.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
        let tick = self.tick;
        let pool = self.pool.as_ref();
        let cfg = &self.cfg;
        let catalog = &self.catalog;

        // === 1. PRODUCTION ===
        let produced = in_pool(pool, || run_production(&mut self.agents, catalog, cfg, tick));

        // === 2. OFFERS ===
        let bands: Vec<PriceStats> = self.markets.iter().map(|m| m.band).collect();
        in_pool(pool, || {
            generate_offers(&self.agents, catalog, &bands, cfg, tick, &mut self.book)
        });
        let offers = self.book.len();

        // === 3. CLEARING ===
        let clearings = in_pool(pool, || clear_all(&self.book, &self.agents, cfg, tick));

        self.ledger.reset(self.agents.len());
        let mut fills = Vec::new();
        for clearing in &clearings {
            clearing.apply(&mut self.agents, &mut self.ledger);
            if let Some(market) = self.markets.get_mut(clearing.good) {
                market.record(
                    clearing.ask_volume,
                    clearing.bid_volume,
                    clearing.traded_volume,
                    clearing.traded_value,
                    cfg,
                );
            }

            #[cfg(feature = "instrument")]
            {
                for fill in &clearing.fills {
                    tracing::info!(
                        target: "trade",
                        tick = tick,
                        good_id = fill.good,
                        seller = fill.seller.to_u64(),
                        buyer = fill.buyer.to_u64(),
                        quantity = fill.quantity,
                        price = fill.price,
                    );
                }
            }

            fills.extend_from_slice(&clearing.fills);
        }

        // === 4. SETTLEMENT ===
        let archetype_count = catalog.archetype_count();
        let settlement = in_pool(pool, || {
            settle(&mut self.agents, &self.ledger, archetype_count, cfg)
        });
        update_profit_ema(
            &mut self.profit_ema,
            &settlement.archetype_profit,
            &settlement.population,
            cfg,
        );

        #[cfg(feature = "instrument")]
        {
            for b in &settlement.bankrupt {
                tracing::info!(
                    target: "bankruptcy",
                    tick = tick,
                    agent = b.agent.to_u64(),
                    archetype = b.archetype,
                    money = b.money,
                );
            }
        }

        // === 5. PRICE TRACKER ===
        in_pool(pool, || refresh_all(&mut self.agents, tick, cfg));
        for (good, market) in self.markets.iter_mut().enumerate() {
            if let Some(band) = aggregate_good(&self.agents, good, market.band.mean) {
                market.band = band;
            }
            self.history.record_good(good, market);

            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "good_market",
                tick = tick,
                good_id = good,
                asks = market.asks,
                bids = market.bids,
                traded = market.traded,
                avg_price = market.avg_price,
                ask_ema = market.ask_ema,
                bid_ema = market.bid_ema,
                traded_ema = market.traded_ema,
                mean = market.band.mean,
                min = market.band.min,
                max = market.band.max,
            );
        }

        // === 6. REPLACEMENT ===
        let mut replacement = None;
        let mut spawned = Vec::new();
        if !settlement.bankrupt.is_empty() {
            replacement = choose_replacement(catalog, &self.markets, &self.profit_ema, cfg);
            if let Some(choice) = replacement {
                spawned = replace_bankrupt(
                    &mut self.agents,
                    catalog,
                    cfg,
                    &settlement.bankrupt,
                    choice,
                );

                #[cfg(feature = "instrument")]
                {
                    let reason = match choice.reason {
                        crate::replacement::ReplacementReason::Scarce { .. } => "scarce",
                        crate::replacement::ReplacementReason::Profitable => "profitable",
                    };
                    tracing::info!(
                        target: "respawn",
                        tick = tick,
                        archetype = choice.archetype,
                        count = spawned.len(),
                        reason = reason,
                    );
                }
            }
        }

        let census = self.agents.census(archetype_count);
        for (archetype, &population) in census.iter().enumerate() {
            let profit = self.profit_ema.get(archetype).copied().unwrap_or(0.0);
            self.history.record_archetype(archetype, profit, population);

            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "archetype",
                tick = tick,
                archetype = archetype,
                population = population,
                profit_ema = profit,
            );
        }

        // === 7. RESET ===
        self.book.clear();
        self.report = TickReport {
            tick,
            produced,
            offers,
            fills,
            bankrupt: settlement.bankrupt,
            spawned,
            replacement,
        };
    }

    /// Run `n` ticks.
    pub fn run(&mut self, n: u64) {
        for _ in 0..n {
            self.advance_tick();
        }
    }

    // === Snapshot ===

    pub fn snapshot(&self) -> MarketSnapshot {
        let census = self.agents.census(self.catalog.archetype_count());

        let mut money = vec![0.0; self.catalog.archetype_count()];
        for view in self.agents.iter() {
            if let Some(m) = money.get_mut(view.archetype) {
                *m += view.money();
            }
        }

        let goods = self
            .catalog
            .goods()
            .iter()
            .zip(&self.markets)
            .enumerate()
            .map(|(id, (def, m))| GoodSnapshot {
                id: id as u32,
                name: def.name.clone(),
                avg_price: m.avg_price,
                mean: m.band.mean,
                min: m.band.min,
                max: m.band.max,
                asks: m.asks,
                bids: m.bids,
                traded: m.traded,
                ask_ema: m.ask_ema,
                bid_ema: m.bid_ema,
                traded_ema: m.traded_ema,
                scarcity: m.scarcity(&self.cfg),
                held: self.agents.inventories().iter().map(|i| i.get(id)).sum(),
            })
            .collect();

        let archetypes = self
            .catalog
            .archetypes()
            .iter()
            .enumerate()
            .map(|(id, def)| {
                let population = census[id];
                ArchetypeSnapshot {
                    id: id as u32,
                    name: def.name.clone(),
                    population: population as u32,
                    profit_ema: self.profit_ema[id],
                    mean_money: if population > 0 {
                        money[id] / population as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        MarketSnapshot {
            tick: self.tick,
            agents: self.agents.len() as u32,
            total_money: self.agents.total_money(),
            goods,
            archetypes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Archetype, GoodDef, Recipe};

    const FOOD: GoodId = 0;
    const WOOD: GoodId = 1;

    fn catalog() -> Catalog {
        let goods = vec![GoodDef::new("Food", 1.0), GoodDef::new("Wood", 0.5)];
        let farmer = Archetype::new("Farmer", 2)
            .with_cost_of_living(FOOD, 1.0)
            .with_ideal(FOOD, 3.0)
            .with_ideal(WOOD, 3.0)
            .with_start(FOOD, 5.0)
            .with_start(WOOD, 3.0)
            .with_limit(FOOD, 20.0)
            .with_recipe(Recipe::new().consume(WOOD, 1.0, 0.1).produce(FOOD, 4.0));
        let woodcutter = Archetype::new("Woodcutter", 2)
            .with_cost_of_living(FOOD, 1.0)
            .with_ideal(FOOD, 3.0)
            .with_start(FOOD, 5.0)
            .with_limit(WOOD, 20.0)
            .with_recipe(Recipe::new().produce(WOOD, 2.0));
        Catalog::new(goods, vec![farmer, woodcutter]).unwrap()
    }

    #[test]
    fn test_spawn_validates_input() {
        let mut world = World::new(catalog(), MarketConfig::default()).unwrap();
        assert_eq!(world.spawn(0, 3, 100.0).unwrap().len(), 3);
        assert_eq!(world.spawn_named("Woodcutter", 2, 100.0).unwrap().len(), 2);
        assert_eq!(world.spawn(7, 1, 1.0), Err(SimError::UnknownArchetype(7)));
        assert!(matches!(
            world.spawn_named("Miner", 1, 1.0),
            Err(SimError::UnknownArchetypeName(_))
        ));
        assert!(matches!(
            world.spawn(0, 1, f64::NAN),
            Err(SimError::InvalidMoney(_))
        ));
        assert_eq!(world.agents().len(), 5);
    }

    #[test]
    fn test_new_rejects_inverted_ask_band() {
        let cfg = MarketConfig {
            min_ask_price: 6.0,
            max_ask_price: 5.0,
            ..Default::default()
        };
        assert!(matches!(
            World::new(catalog(), cfg),
            Err(SimError::Config { field: "min_ask_price", .. })
        ));
    }

    #[test]
    fn test_tick_advances_and_records_history() {
        let mut world = World::new(catalog(), MarketConfig::default()).unwrap();
        world.spawn(0, 4, 100.0).unwrap();
        world.spawn(1, 4, 100.0).unwrap();

        world.run(10);

        assert_eq!(world.tick, 10);
        assert_eq!(world.last_report().tick, 10);
        assert_eq!(world.history().len(), 10);
        assert_eq!(world.history().prices(FOOD).len(), 11);
        assert_eq!(world.history().archetypes[0].population.len(), 10);

        let snapshot = world.snapshot();
        assert_eq!(snapshot.tick, 10);
        assert_eq!(snapshot.goods.len(), 2);
        let population: u32 = snapshot.archetypes.iter().map(|a| a.population).sum();
        assert_eq!(population, 8, "replacement keeps population constant");
    }

    #[test]
    fn test_same_seed_same_run() {
        let run = |threads| {
            let cfg = MarketConfig::default().with_seed(11).with_worker_threads(threads);
            let mut world = World::new(catalog(), cfg).unwrap();
            world.spawn(0, 6, 20.0).unwrap();
            world.spawn(1, 6, 20.0).unwrap();
            world.run(15);
            world.snapshot()
        };
        assert_eq!(run(1), run(4), "thread count must not change results");
    }
}
