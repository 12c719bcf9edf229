use thiserror::Error;

use crate::types::{ArchetypeId, GoodId};

/// Problems found while building the read-only catalog tables.
///
/// The tick pipeline assumes a closed, consistent index space, so every one of
/// these is caught before a `World` exists.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("catalog has no goods")]
    NoGoods,
    #[error("catalog has no archetypes")]
    NoArchetypes,
    #[error("duplicate good name `{0}`")]
    DuplicateGood(String),
    #[error("duplicate archetype name `{0}`")]
    DuplicateArchetype(String),
    #[error("unknown good `{name}` referenced by archetype `{archetype}`")]
    UnknownGood { archetype: String, name: String },
    #[error("good {good} has invalid initial price {price}")]
    InvalidPrice { good: GoodId, price: f64 },
    #[error("archetype {archetype}: `{table}` has {len} entries, expected {expected}")]
    TableSize {
        archetype: ArchetypeId,
        table: &'static str,
        len: usize,
        expected: usize,
    },
    #[error("archetype {archetype}: recipe {recipe} has an invalid delta range")]
    RecipeRange { archetype: ArchetypeId, recipe: usize },
    #[error("archetype {archetype}: delta {delta} references good {good} out of range")]
    DeltaGood {
        archetype: ArchetypeId,
        delta: usize,
        good: GoodId,
    },
    #[error("archetype {archetype}: delta {delta} has probability {probability} outside [0, 1]")]
    Probability {
        archetype: ArchetypeId,
        delta: usize,
        probability: f64,
    },
    #[error("archetype {archetype}: `{table}` holds a negative or non-finite quantity")]
    Quantity {
        archetype: ArchetypeId,
        table: &'static str,
    },
    #[error("invalid catalog json: {0}")]
    Json(String),
}

/// Errors surfaced by world construction and seeding.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("unknown archetype {0}")]
    UnknownArchetype(ArchetypeId),
    #[error("unknown archetype `{0}`")]
    UnknownArchetypeName(String),
    #[error("invalid starting money {0}")]
    InvalidMoney(f64),
    #[error("invalid config `{field}`: {reason}")]
    Config {
        field: &'static str,
        reason: &'static str,
    },
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}
