// Upkeep and recipe execution (production/consumption phase)

use rand::Rng;
use rayon::prelude::*;

use crate::agents::{AgentState, AgentStore, Inventory, Wallet};
use crate::catalog::{Archetype, Catalog};
use crate::config::MarketConfig;
use crate::types::{GoodId, Quantity, agent_rng};

use super::recipe::{scaling_factor, select_recipe};

// === UPKEEP ===

/// Pay the archetype's cost of living and money upkeep.
///
/// Sets `state.skipping` when a good ran short or a production limit was
/// reached. Money may go negative here; insolvency is settlement's call.
pub fn apply_upkeep(
    archetype: &Archetype,
    inventory: &mut Inventory,
    wallet: &mut Wallet,
    state: &mut AgentState,
) {
    for (good, upkeep) in archetype.upkeep.iter().enumerate() {
        let after = inventory.get(good) - upkeep.cost_of_living;
        if after < 0.0 {
            state.skipping = true;
        }
        inventory.set(good, after);

        if upkeep
            .production_limit
            .is_some_and(|limit| inventory.get(good) >= limit)
        {
            state.skipping = true;
        }
    }

    wallet.money -= archetype.money_upkeep;
}

// === EXECUTION ===

/// What one recipe run did to the inventory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecipeRun {
    pub recipe: usize,
    pub factor: Quantity,
    pub consumed: Vec<(GoodId, Quantity)>,
    pub produced: Vec<(GoodId, Quantity)>,
}

/// Run recipe `index` once. Each consume entry rolls its own trigger.
pub fn execute_recipe<R: Rng>(
    archetype: &Archetype,
    index: usize,
    inventory: &mut Inventory,
    rng: &mut R,
) -> RecipeRun {
    let recipe = archetype.recipes[index];
    let consumes = archetype.consumes(&recipe);
    let factor = scaling_factor(consumes, inventory);

    let mut run = RecipeRun {
        recipe: index,
        factor,
        ..Default::default()
    };

    for d in consumes {
        let roll: f64 = rng.random();
        if roll >= d.probability {
            continue;
        }
        let amount = if d.is_variable() {
            factor.min(inventory.get(d.good))
        } else {
            d.quantity
        };
        let removed = inventory.remove(d.good, amount);
        run.consumed.push((d.good, removed));
    }

    for d in archetype.produces(&recipe) {
        let amount = if d.is_variable() {
            d.magnitude() * factor
        } else {
            d.quantity
        };
        inventory.add(d.good, amount);
        run.produced.push((d.good, amount));
    }

    run
}

/// Full production step for one agent. Returns the recipe run, if any.
pub fn produce<R: Rng>(
    archetype: &Archetype,
    state: &mut AgentState,
    wallet: &mut Wallet,
    inventory: &mut Inventory,
    rng: &mut R,
    cfg: &MarketConfig,
) -> Option<RecipeRun> {
    wallet.money_last_round = wallet.money;
    apply_upkeep(archetype, inventory, wallet, state);

    if state.skipping {
        state.skipping = false;
        return None;
    }

    let index = select_recipe(archetype, inventory)?;
    let run = execute_recipe(archetype, index, inventory, rng);
    state.recipe_ema = cfg.recipe_smoothing * state.recipe_ema
        + (1.0 - cfg.recipe_smoothing) * index as f64;
    Some(run)
}

/// Production/consumption phase, one task per agent.
/// Returns how many agents ran a recipe.
pub fn run_production(
    agents: &mut AgentStore,
    catalog: &Catalog,
    cfg: &MarketConfig,
    tick: u64,
) -> usize {
    let cols = agents.columns_mut();
    cols.handles
        .par_iter()
        .zip(cols.archetypes.par_iter())
        .zip(cols.states.par_iter_mut())
        .zip(cols.wallets.par_iter_mut())
        .zip(cols.inventories.par_iter_mut())
        .filter_map(|((((&id, &archetype), state), wallet), inventory)| {
            let archetype = catalog.archetype(archetype)?;
            let mut rng = agent_rng(cfg.seed, tick, id);
            produce(archetype, state, wallet, inventory, &mut rng, cfg)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GoodDef, Recipe};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const FOOD: GoodId = 0;
    const WOOD: GoodId = 1;
    const PLANK: GoodId = 2;

    fn goods() -> Vec<GoodDef> {
        vec![
            GoodDef::new("Food", 1.0),
            GoodDef::new("Wood", 0.5),
            GoodDef::new("Plank", 2.0),
        ]
    }

    fn inventory(food: f64, wood: f64, plank: f64) -> Inventory {
        let mut inv = Inventory::new(&goods());
        inv.set(FOOD, food);
        inv.set(WOOD, wood);
        inv.set(PLANK, plank);
        inv
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_upkeep_shortfall_skips_production() {
        let sawmill = Archetype::new("Sawmill", 3)
            .with_cost_of_living(FOOD, 2.0)
            .with_money_upkeep(1.5)
            .with_recipe(Recipe::new().consume(WOOD, 1.0, 1.0).produce(PLANK, 1.0));
        let mut inv = inventory(1.0, 5.0, 0.0);
        let mut wallet = Wallet::new(10.0);
        let mut state = AgentState::default();

        let run = produce(&sawmill, &mut state, &mut wallet, &mut inv, &mut rng(), &MarketConfig::default());

        assert!(run.is_none());
        assert_eq!(inv.get(FOOD), 0.0, "shortfall clamps to zero");
        assert_eq!(inv.get(WOOD), 5.0, "no production while skipping");
        assert!(!state.skipping, "flag is reset for the next tick");
        assert_eq!(wallet.money, 8.5);
        assert_eq!(wallet.money_last_round, 10.0);
    }

    #[test]
    fn test_production_limit_skips() {
        let sawmill = Archetype::new("Sawmill", 3)
            .with_limit(PLANK, 10.0)
            .with_recipe(Recipe::new().consume(WOOD, 1.0, 1.0).produce(PLANK, 1.0));
        let mut inv = inventory(0.0, 5.0, 10.0);
        let mut wallet = Wallet::new(10.0);
        let mut state = AgentState::default();

        let run = produce(&sawmill, &mut state, &mut wallet, &mut inv, &mut rng(), &MarketConfig::default());
        assert!(run.is_none());
        assert_eq!(inv.get(PLANK), 10.0);
    }

    #[test]
    fn test_money_upkeep_can_go_negative() {
        let idle = Archetype::new("Idle", 3).with_money_upkeep(5.0);
        let mut inv = inventory(0.0, 0.0, 0.0);
        let mut wallet = Wallet::new(2.0);
        let mut state = AgentState::default();
        apply_upkeep(&idle, &mut inv, &mut wallet, &mut state);
        assert_eq!(wallet.money, -3.0);
        assert!(!state.skipping);
    }

    #[test]
    fn test_variable_recipe_shares_scaling_factor() {
        // Up to 10 wood, 2 planks per wood actually used
        let sawmill = Archetype::new("Sawmill", 3)
            .with_recipe(Recipe::new().consume(WOOD, -10.0, 1.0).produce(PLANK, -2.0));
        let mut inv = inventory(0.0, 3.0, 0.0);

        let run = execute_recipe(&sawmill, 0, &mut inv, &mut rng());

        assert_eq!(run.factor, 3.0);
        assert_eq!(inv.get(WOOD), 0.0);
        assert_eq!(inv.get(PLANK), 6.0);
    }

    #[test]
    fn test_zero_probability_never_consumes() {
        let farm = Archetype::new("Farm", 3)
            .with_recipe(Recipe::new().consume(WOOD, 1.0, 0.0).produce(FOOD, 2.0));
        let mut inv = inventory(0.0, 4.0, 0.0);
        let mut r = rng();
        for _ in 0..20 {
            execute_recipe(&farm, 0, &mut inv, &mut r);
        }
        assert_eq!(inv.get(WOOD), 4.0, "tools never wear out at p = 0");
        assert_eq!(inv.get(FOOD), 40.0);
    }

    #[test]
    fn test_probability_roll_rate() {
        let farm = Archetype::new("Farm", 3)
            .with_recipe(Recipe::new().consume(WOOD, 1.0, 0.25).produce(FOOD, 1.0));
        let mut r = rng();
        let trials = 2000;
        let mut used = 0;
        for _ in 0..trials {
            let mut inv = inventory(0.0, 1.0, 0.0);
            execute_recipe(&farm, 0, &mut inv, &mut r);
            if inv.get(WOOD) == 0.0 {
                used += 1;
            }
        }
        let rate = used as f64 / trials as f64;
        assert!(rate > 0.2 && rate < 0.3, "rate = {rate}");
    }

    #[test]
    fn test_records_recipe_index() {
        let baker = Archetype::new("Baker", 3)
            .with_recipe(Recipe::new().consume(PLANK, 5.0, 1.0).produce(FOOD, 1.0))
            .with_recipe(Recipe::new().consume(WOOD, 1.0, 1.0).produce(FOOD, 1.0));
        let mut inv = inventory(0.0, 2.0, 0.0);
        let mut wallet = Wallet::new(1.0);
        let mut state = AgentState::default();
        let cfg = MarketConfig::default();

        let run = produce(&baker, &mut state, &mut wallet, &mut inv, &mut rng(), &cfg).unwrap();
        assert_eq!(run.recipe, 1);
        assert!((state.recipe_ema - 0.1).abs() < 1e-12);
    }
}
