// Catalog - read-only good and archetype tables shared by every agent

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::types::{ArchetypeId, GoodId, Money, Price, Quantity};

// === GOODS ===

#[derive(Debug, Clone, PartialEq)]
pub struct GoodDef {
    pub name: String,
    pub initial_price: Price,
}

impl GoodDef {
    pub fn new(name: impl Into<String>, initial_price: Price) -> Self {
        Self {
            name: name.into(),
            initial_price,
        }
    }
}

// === RECIPES ===

/// One consume or produce line of a recipe.
///
/// Positive quantities are fixed amounts. A negative quantity on the consume
/// side means "at least one unit, up to |quantity|", and on the produce side
/// "|quantity| per unit of the recipe's scaling factor".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaEntry {
    pub good: GoodId,
    pub quantity: Quantity,
    pub probability: f64,
}

impl DeltaEntry {
    pub fn new(good: GoodId, quantity: Quantity, probability: f64) -> Self {
        Self {
            good,
            quantity,
            probability,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.quantity < 0.0
    }

    /// Units that must be on hand for this entry to be satisfiable.
    pub fn required(&self) -> Quantity {
        self.quantity.max(1.0)
    }

    pub fn magnitude(&self) -> Quantity {
        self.quantity.abs()
    }
}

/// Half-open slices into an archetype's delta table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeRange {
    pub consume_start: usize,
    pub produce_start: usize,
    pub produce_end: usize,
}

impl RecipeRange {
    pub fn consumes(&self) -> Range<usize> {
        self.consume_start..self.produce_start
    }

    pub fn produces(&self) -> Range<usize> {
        self.produce_start..self.produce_end
    }
}

/// Builder for one recipe; flattened into the archetype's delta table.
#[derive(Debug, Clone, Default)]
pub struct Recipe {
    pub consumes: Vec<DeltaEntry>,
    pub produces: Vec<DeltaEntry>,
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consume(mut self, good: GoodId, quantity: Quantity, probability: f64) -> Self {
        self.consumes.push(DeltaEntry::new(good, quantity, probability));
        self
    }

    pub fn produce(mut self, good: GoodId, quantity: Quantity) -> Self {
        self.produces.push(DeltaEntry::new(good, quantity, 1.0));
        self
    }
}

// === ARCHETYPES ===

/// Per-good upkeep line: what is eaten every tick and where production stops.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Upkeep {
    pub cost_of_living: Quantity,
    pub production_limit: Option<Quantity>,
}

/// Shared production/consumption profile of a class of agents.
#[derive(Debug, Clone, PartialEq)]
pub struct Archetype {
    pub name: String,
    /// One entry per good.
    pub upkeep: Vec<Upkeep>,
    /// Synthetic upkeep entry paid straight from the wallet.
    pub money_upkeep: Money,
    pub ideal: Vec<Quantity>,
    pub start: Vec<Quantity>,
    /// Declaration order is priority order.
    pub recipes: Vec<RecipeRange>,
    pub deltas: Vec<DeltaEntry>,
}

impl Archetype {
    pub fn new(name: impl Into<String>, good_count: usize) -> Self {
        Self {
            name: name.into(),
            upkeep: vec![Upkeep::default(); good_count],
            money_upkeep: 0.0,
            ideal: vec![0.0; good_count],
            start: vec![0.0; good_count],
            recipes: Vec::new(),
            deltas: Vec::new(),
        }
    }

    pub fn with_cost_of_living(mut self, good: GoodId, quantity: Quantity) -> Self {
        self.upkeep[good].cost_of_living = quantity;
        self
    }

    pub fn with_limit(mut self, good: GoodId, quantity: Quantity) -> Self {
        self.upkeep[good].production_limit = Some(quantity);
        self
    }

    pub fn with_money_upkeep(mut self, money: Money) -> Self {
        self.money_upkeep = money;
        self
    }

    pub fn with_ideal(mut self, good: GoodId, quantity: Quantity) -> Self {
        self.ideal[good] = quantity;
        self
    }

    pub fn with_start(mut self, good: GoodId, quantity: Quantity) -> Self {
        self.start[good] = quantity;
        self
    }

    pub fn with_recipe(mut self, recipe: Recipe) -> Self {
        let consume_start = self.deltas.len();
        self.deltas.extend(recipe.consumes);
        let produce_start = self.deltas.len();
        self.deltas.extend(recipe.produces);
        self.recipes.push(RecipeRange {
            consume_start,
            produce_start,
            produce_end: self.deltas.len(),
        });
        self
    }

    pub fn consumes(&self, recipe: &RecipeRange) -> &[DeltaEntry] {
        &self.deltas[recipe.consumes()]
    }

    pub fn produces(&self, recipe: &RecipeRange) -> &[DeltaEntry] {
        &self.deltas[recipe.produces()]
    }

    /// Largest single-recipe output of `good`, if any recipe makes it.
    pub fn max_output(&self, good: GoodId) -> Option<Quantity> {
        self.recipes
            .iter()
            .flat_map(|r| self.produces(r))
            .filter(|d| d.good == good)
            .map(|d| d.magnitude())
            .reduce(f64::max)
    }
}

// === CATALOG ===

#[derive(Debug, Clone)]
pub struct Catalog {
    goods: Vec<GoodDef>,
    archetypes: Vec<Archetype>,
    /// Per good: the archetype with the largest recipe output of it.
    dominant_producer: Vec<Option<ArchetypeId>>,
}

impl Catalog {
    pub fn new(goods: Vec<GoodDef>, archetypes: Vec<Archetype>) -> Result<Self, CatalogError> {
        validate(&goods, &archetypes)?;

        let dominant_producer = (0..goods.len())
            .map(|good| {
                let mut best: Option<(ArchetypeId, Quantity)> = None;
                for (id, archetype) in archetypes.iter().enumerate() {
                    if let Some(out) = archetype.max_output(good) {
                        if best.is_none_or(|(_, q)| out > q) {
                            best = Some((id, out));
                        }
                    }
                }
                best.map(|(id, _)| id)
            })
            .collect();

        Ok(Self {
            goods,
            archetypes,
            dominant_producer,
        })
    }

    pub fn good_count(&self) -> usize {
        self.goods.len()
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn goods(&self) -> &[GoodDef] {
        &self.goods
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn good(&self, id: GoodId) -> Option<&GoodDef> {
        self.goods.get(id)
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    pub fn good_by_name(&self, name: &str) -> Option<GoodId> {
        self.goods.iter().position(|g| g.name == name)
    }

    pub fn archetype_by_name(&self, name: &str) -> Option<ArchetypeId> {
        self.archetypes.iter().position(|a| a.name == name)
    }

    pub fn dominant_producer(&self, good: GoodId) -> Option<ArchetypeId> {
        self.dominant_producer.get(good).copied().flatten()
    }
}

fn check_quantities(
    archetype: ArchetypeId,
    table: &'static str,
    mut values: impl Iterator<Item = Quantity>,
) -> Result<(), CatalogError> {
    if values.all(|q| q.is_finite() && q >= 0.0) {
        Ok(())
    } else {
        Err(CatalogError::Quantity { archetype, table })
    }
}

fn validate(goods: &[GoodDef], archetypes: &[Archetype]) -> Result<(), CatalogError> {
    if goods.is_empty() {
        return Err(CatalogError::NoGoods);
    }
    if archetypes.is_empty() {
        return Err(CatalogError::NoArchetypes);
    }

    for (id, good) in goods.iter().enumerate() {
        if !(good.initial_price.is_finite() && good.initial_price > 0.0) {
            return Err(CatalogError::InvalidPrice {
                good: id,
                price: good.initial_price,
            });
        }
    }

    let n = goods.len();
    for (id, a) in archetypes.iter().enumerate() {
        for (table, len) in [
            ("upkeep", a.upkeep.len()),
            ("ideal", a.ideal.len()),
            ("start", a.start.len()),
        ] {
            if len != n {
                return Err(CatalogError::TableSize {
                    archetype: id,
                    table,
                    len,
                    expected: n,
                });
            }
        }

        check_quantities(id, "cost_of_living", a.upkeep.iter().map(|u| u.cost_of_living))?;
        check_quantities(id, "limit", a.upkeep.iter().filter_map(|u| u.production_limit))?;
        check_quantities(id, "ideal", a.ideal.iter().copied())?;
        check_quantities(id, "start", a.start.iter().copied())?;
        check_quantities(id, "money_upkeep", std::iter::once(a.money_upkeep))?;

        for (recipe, r) in a.recipes.iter().enumerate() {
            if r.consume_start > r.produce_start
                || r.produce_start > r.produce_end
                || r.produce_end > a.deltas.len()
            {
                return Err(CatalogError::RecipeRange {
                    archetype: id,
                    recipe,
                });
            }
        }

        for (delta, d) in a.deltas.iter().enumerate() {
            if d.good >= n {
                return Err(CatalogError::DeltaGood {
                    archetype: id,
                    delta,
                    good: d.good,
                });
            }
            if !(0.0..=1.0).contains(&d.probability) {
                return Err(CatalogError::Probability {
                    archetype: id,
                    delta,
                    probability: d.probability,
                });
            }
            if !d.quantity.is_finite() {
                return Err(CatalogError::Quantity {
                    archetype: id,
                    table: "deltas",
                });
            }
        }
    }

    Ok(())
}

// ============================================================================
// Named definitions - the shape of the good / factory definition files
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodJson {
    pub name: String,
    pub initial_cost: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedQuantity {
    pub name: String,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedDelta {
    pub name: String,
    pub quantity: Quantity,
    #[serde(default = "always")]
    pub possibility: f64,
}

fn always() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltasJson {
    #[serde(default)]
    pub consumes: Vec<NamedDelta>,
    #[serde(default)]
    pub produces: Vec<NamedDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchetypeJson {
    pub name: String,
    #[serde(default)]
    pub cost_of_living: Vec<NamedQuantity>,
    #[serde(default)]
    pub limit_goods: Vec<NamedQuantity>,
    #[serde(default)]
    pub ideal_quantity: Vec<NamedQuantity>,
    #[serde(default)]
    pub start_quantity: Vec<NamedQuantity>,
    #[serde(default)]
    pub money_upkeep: Money,
    #[serde(default)]
    pub possible_deltas: Vec<DeltasJson>,
}

/// Whole catalog as named definitions, resolved once into index tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDef {
    pub goods: Vec<GoodJson>,
    #[serde(alias = "factories")]
    pub archetypes: Vec<ArchetypeJson>,
}

impl CatalogDef {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(json).map_err(|e| CatalogError::Json(e.to_string()))
    }

    /// Resolve every name to its index and build the validated catalog.
    pub fn resolve(&self) -> Result<Catalog, CatalogError> {
        let mut index: HashMap<&str, GoodId> = HashMap::new();
        for good in &self.goods {
            if index.insert(good.name.as_str(), index.len()).is_some() {
                return Err(CatalogError::DuplicateGood(good.name.clone()));
            }
        }
        let goods: Vec<GoodDef> = self
            .goods
            .iter()
            .map(|g| GoodDef::new(g.name.clone(), g.initial_cost))
            .collect();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut archetypes = Vec::with_capacity(self.archetypes.len());
        for def in &self.archetypes {
            if !seen.insert(def.name.as_str()) {
                return Err(CatalogError::DuplicateArchetype(def.name.clone()));
            }

            let lookup = |name: &str| {
                index
                    .get(name)
                    .copied()
                    .ok_or_else(|| CatalogError::UnknownGood {
                        archetype: def.name.clone(),
                        name: name.to_string(),
                    })
            };

            let mut archetype =
                Archetype::new(def.name.clone(), goods.len()).with_money_upkeep(def.money_upkeep);
            for v in &def.cost_of_living {
                archetype = archetype.with_cost_of_living(lookup(&v.name)?, v.quantity);
            }
            for v in &def.limit_goods {
                archetype = archetype.with_limit(lookup(&v.name)?, v.quantity);
            }
            for v in &def.ideal_quantity {
                archetype = archetype.with_ideal(lookup(&v.name)?, v.quantity);
            }
            for v in &def.start_quantity {
                archetype = archetype.with_start(lookup(&v.name)?, v.quantity);
            }
            for deltas in &def.possible_deltas {
                let mut recipe = Recipe::new();
                for c in &deltas.consumes {
                    recipe = recipe.consume(lookup(&c.name)?, c.quantity, c.possibility);
                }
                for p in &deltas.produces {
                    recipe
                        .produces
                        .push(DeltaEntry::new(lookup(&p.name)?, p.quantity, p.possibility));
                }
                archetype = archetype.with_recipe(recipe);
            }
            archetypes.push(archetype);
        }

        Catalog::new(goods, archetypes)
    }
}
