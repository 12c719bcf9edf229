// Structure-of-arrays agent store with generational handles

use slotmap::SlotMap;

use crate::catalog::Catalog;
use crate::config::MarketConfig;
use crate::prices::{PriceMemories, PriceStats};
use crate::types::{AgentId, ArchetypeId, Money, Quantity};

use super::inventory::{AgentState, InvSlot, Inventory, Wallet};

/// Mutable borrows of every column at once, for the parallel phases.
pub struct AgentColumnsMut<'a> {
    pub handles: &'a [AgentId],
    pub archetypes: &'a [ArchetypeId],
    pub states: &'a mut [AgentState],
    pub wallets: &'a mut [Wallet],
    pub inventories: &'a mut [Inventory],
    pub stats: &'a mut [Vec<PriceStats>],
    pub memories: &'a mut [PriceMemories],
}

/// Read-only view of one agent.
#[derive(Debug, Clone, Copy)]
pub struct AgentView<'a> {
    pub id: AgentId,
    pub archetype: ArchetypeId,
    pub state: &'a AgentState,
    pub wallet: &'a Wallet,
    pub inventory: &'a Inventory,
    pub stats: &'a [PriceStats],
}

impl AgentView<'_> {
    pub fn money(&self) -> Money {
        self.wallet.money
    }

    pub fn quantity(&self, good: usize) -> Quantity {
        self.inventory.get(good)
    }

    pub fn slot(&self, good: usize) -> InvSlot {
        self.inventory.slot(good)
    }

    pub fn profit(&self) -> Money {
        self.wallet.profit
    }

    pub fn recipe_ema(&self) -> f64 {
        self.state.recipe_ema
    }
}

/// Dense rows; row `i` of every column belongs to `handles[i]`.
///
/// Rows are only reordered by `remove`, which runs between ticks, so a row
/// index is a stable key for the duration of one tick.
#[derive(Debug, Default)]
pub struct AgentStore {
    slots: SlotMap<AgentId, usize>,
    handles: Vec<AgentId>,
    archetypes: Vec<ArchetypeId>,
    states: Vec<AgentState>,
    wallets: Vec<Wallet>,
    inventories: Vec<Inventory>,
    stats: Vec<Vec<PriceStats>>,
    memories: Vec<PriceMemories>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Insert a fresh agent of `archetype` built from its starting template.
    /// The caller guarantees `archetype` is in the catalog.
    pub fn spawn(
        &mut self,
        catalog: &Catalog,
        cfg: &MarketConfig,
        archetype: ArchetypeId,
        money: Money,
    ) -> Option<AgentId> {
        let template = catalog.archetype(archetype)?;
        let inventory = Inventory::starting(catalog.goods(), template);
        let stats = catalog
            .goods()
            .iter()
            .map(|g| PriceStats::seeded(g.initial_price, cfg.seed_band))
            .collect();

        let row = self.handles.len();
        let id = self.slots.insert(row);
        self.handles.push(id);
        self.archetypes.push(archetype);
        self.states.push(AgentState::default());
        self.wallets.push(Wallet::new(money));
        self.inventories.push(inventory);
        self.stats.push(stats);
        self.memories.push(PriceMemories::default());
        self.debug_assert_coherent();
        Some(id)
    }

    /// Destroy `id`. The handle never resolves again.
    pub fn remove(&mut self, id: AgentId) -> bool {
        let Some(row) = self.slots.remove(id) else {
            return false;
        };
        self.handles.swap_remove(row);
        self.archetypes.swap_remove(row);
        self.states.swap_remove(row);
        self.wallets.swap_remove(row);
        self.inventories.swap_remove(row);
        self.stats.swap_remove(row);
        self.memories.swap_remove(row);
        if let Some(&moved) = self.handles.get(row) {
            if let Some(slot) = self.slots.get_mut(moved) {
                *slot = row;
            }
        }
        self.debug_assert_coherent();
        true
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn row_of(&self, id: AgentId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    pub fn handles(&self) -> &[AgentId] {
        &self.handles
    }

    pub fn archetypes(&self) -> &[ArchetypeId] {
        &self.archetypes
    }

    pub fn inventories(&self) -> &[Inventory] {
        &self.inventories
    }

    pub fn inventories_mut(&mut self) -> &mut [Inventory] {
        &mut self.inventories
    }

    pub fn stats(&self) -> &[Vec<PriceStats>] {
        &self.stats
    }

    pub fn memories(&self) -> &[PriceMemories] {
        &self.memories
    }

    pub fn columns_mut(&mut self) -> AgentColumnsMut<'_> {
        AgentColumnsMut {
            handles: &self.handles,
            archetypes: &self.archetypes,
            states: &mut self.states,
            wallets: &mut self.wallets,
            inventories: &mut self.inventories,
            stats: &mut self.stats,
            memories: &mut self.memories,
        }
    }

    pub fn get(&self, id: AgentId) -> Option<AgentView<'_>> {
        let row = self.row_of(id)?;
        Some(AgentView {
            id,
            archetype: self.archetypes[row],
            state: &self.states[row],
            wallet: &self.wallets[row],
            inventory: &self.inventories[row],
            stats: &self.stats[row],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = AgentView<'_>> + '_ {
        self.handles.iter().filter_map(|&id| self.get(id))
    }

    pub fn inventory_mut(&mut self, id: AgentId) -> Option<&mut Inventory> {
        let row = self.row_of(id)?;
        self.inventories.get_mut(row)
    }

    /// Population per archetype, sized to `archetype_count`.
    pub fn census(&self, archetype_count: usize) -> Vec<usize> {
        let mut counts = vec![0; archetype_count];
        for &a in &self.archetypes {
            if let Some(c) = counts.get_mut(a) {
                *c += 1;
            }
        }
        counts
    }

    pub fn total_money(&self) -> Money {
        self.wallets.iter().map(|w| w.money).sum()
    }

    #[inline]
    fn debug_assert_coherent(&self) {
        debug_assert_eq!(self.handles.len(), self.slots.len());
        debug_assert_eq!(self.handles.len(), self.archetypes.len());
        debug_assert_eq!(self.handles.len(), self.states.len());
        debug_assert_eq!(self.handles.len(), self.wallets.len());
        debug_assert_eq!(self.handles.len(), self.inventories.len());
        debug_assert_eq!(self.handles.len(), self.stats.len());
        debug_assert_eq!(self.handles.len(), self.memories.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Archetype, GoodDef};

    fn catalog() -> Catalog {
        let goods = vec![GoodDef::new("Grain", 1.0), GoodDef::new("Bread", 2.0)];
        let farm = Archetype::new("Farm", 2).with_start(0, 5.0);
        let baker = Archetype::new("Baker", 2).with_start(1, 2.0);
        Catalog::new(goods, vec![farm, baker]).unwrap()
    }

    #[test]
    fn test_spawn_uses_template() {
        let catalog = catalog();
        let cfg = MarketConfig::default();
        let mut store = AgentStore::new();

        let farm = store.spawn(&catalog, &cfg, 0, 100.0).unwrap();
        let view = store.get(farm).unwrap();
        assert_eq!(view.archetype, 0);
        assert_eq!(view.money(), 100.0);
        assert_eq!(view.quantity(0), 5.0);
        assert_eq!(view.stats[1].mean, 2.0);

        assert!(store.spawn(&catalog, &cfg, 9, 100.0).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_removed_handle_is_stale() {
        let catalog = catalog();
        let cfg = MarketConfig::default();
        let mut store = AgentStore::new();

        let a = store.spawn(&catalog, &cfg, 0, 10.0).unwrap();
        let b = store.spawn(&catalog, &cfg, 1, 20.0).unwrap();
        let c = store.spawn(&catalog, &cfg, 1, 30.0).unwrap();

        assert!(store.remove(a));
        assert!(!store.remove(a), "double removal must be a no-op");
        assert!(store.get(a).is_none());

        // swap_remove moved c into a's row; its handle must still resolve
        assert_eq!(store.get(c).unwrap().money(), 30.0);
        assert_eq!(store.get(b).unwrap().money(), 20.0);

        // Slot reuse bumps the generation
        let d = store.spawn(&catalog, &cfg, 0, 40.0).unwrap();
        assert_ne!(a, d);
        assert!(store.get(a).is_none());
        assert_eq!(store.census(2), vec![1, 2]);
    }
}
