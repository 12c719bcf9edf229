// Recipe selection and scaling

use crate::agents::Inventory;
use crate::catalog::{Archetype, DeltaEntry, RecipeRange};
use crate::types::Quantity;

/// Every consume entry has its required amount on hand.
/// Fixed entries need the full quantity, "up to" entries need one unit.
pub fn is_satisfiable(archetype: &Archetype, recipe: &RecipeRange, inventory: &Inventory) -> bool {
    archetype
        .consumes(recipe)
        .iter()
        .all(|d| inventory.get(d.good) >= d.required())
}

/// Index of the first satisfiable recipe in declaration order.
pub fn select_recipe(archetype: &Archetype, inventory: &Inventory) -> Option<usize> {
    archetype
        .recipes
        .iter()
        .position(|r| is_satisfiable(archetype, r, inventory))
}

/// Shared scaling factor of a recipe run.
///
/// The scarcest "up to" input decides: `min(on hand, |quantity|)` over all
/// variable consume entries. A recipe without variable inputs scales by 1.
pub fn scaling_factor(consumes: &[DeltaEntry], inventory: &Inventory) -> Quantity {
    consumes
        .iter()
        .filter(|d| d.is_variable())
        .map(|d| inventory.get(d.good).min(d.magnitude()))
        .reduce(f64::min)
        .unwrap_or(1.0)
}
