use market_core::market::{Side, agent_offers};
use market_core::prices::PriceStats;
use market_core::{
    Archetype, BidSizing, Catalog, CatalogDef, GoodDef, GoodId, MarketConfig, Recipe,
    ReplacementReason, SimError, UnsoldAskDecay, World,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

const G: GoodId = 0;

/// Seller A holds 8 with an ideal of 5; buyer B holds 2 with an ideal of 5.
fn two_traders() -> Catalog {
    let goods = vec![GoodDef::new("G", 1.0)];
    let a = Archetype::new("A", 1).with_ideal(G, 5.0).with_start(G, 8.0);
    let b = Archetype::new("B", 1).with_ideal(G, 5.0).with_start(G, 2.0);
    Catalog::new(goods, vec![a, b]).unwrap()
}

fn random_bids() -> MarketConfig {
    MarketConfig::default().with_bid_sizing(BidSizing::RandomMultiplier {
        low: 0.5,
        high: 1.5,
    })
}

#[test]
fn scenario_offers_for_surplus_and_shortage() {
    let catalog = two_traders();
    let cfg = random_bids();
    let mut world = World::new(catalog.clone(), cfg.clone()).unwrap();
    let a = world.spawn(0, 1, 10.0).unwrap()[0];
    let b = world.spawn(1, 1, 10.0).unwrap()[0];
    let bands = vec![PriceStats::seeded(1.0, cfg.seed_band)];
    let mut rng = StdRng::seed_from_u64(4);

    let seller = world.agent(a).unwrap();
    let asks = agent_offers(a, 0, &catalog.archetypes()[0], seller.inventory, &bands, &cfg, &mut rng);
    assert_eq!(asks.len(), 1);
    assert_eq!(asks[0].side, Side::Ask);
    assert_eq!(asks[0].units, 8.0);
    assert!((asks[0].price - 1.02).abs() < 1e-12);

    let buyer = world.agent(b).unwrap();
    let bids = agent_offers(b, 1, &catalog.archetypes()[1], buyer.inventory, &bands, &cfg, &mut rng);
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].side, Side::Bid);
    assert_eq!(bids[0].price, 0.0);
    assert!((1.5..=4.5).contains(&bids[0].units), "bid units {}", bids[0].units);
}

#[test]
fn scenario_two_traders_clear_at_ask_price() {
    let cfg = random_bids().with_unsold_decay(UnsoldAskDecay::Disabled);
    let mut world = World::new(two_traders(), cfg).unwrap();
    let a = world.spawn(0, 1, 10.0).unwrap()[0];
    let b = world.spawn(1, 1, 10.0).unwrap()[0];

    world.advance_tick();

    let report = world.last_report();
    assert_eq!(report.fills.len(), 1, "one ask against one bid");
    let fill = report.fills[0];
    assert_eq!(fill.seller, a);
    assert_eq!(fill.buyer, b);
    assert!((fill.price - 1.02).abs() < 1e-12);
    assert!(
        (1.5..=4.5).contains(&fill.quantity),
        "traded min(8, bid) = {}",
        fill.quantity
    );

    let seller = world.agent(a).unwrap().slot(G);
    let buyer = world.agent(b).unwrap().slot(G);
    assert!((seller.quantity - (8.0 - fill.quantity)).abs() < 1e-12);
    assert!((buyer.quantity - (2.0 + fill.quantity)).abs() < 1e-12);
    assert_eq!(buyer.recorded_price, fill.price, "buyer adopts the clearing price");
    assert!(
        seller.recorded_price > 1.0 && seller.recorded_price < 1.02,
        "seller only drifts toward it: {}",
        seller.recorded_price
    );
}

#[test]
fn scenario_first_satisfiable_recipe_runs() {
    let goods = vec![GoodDef::new("Grain", 1.0), GoodDef::new("Bread", 2.0)];
    let baker = Archetype::new("Baker", 2)
        .with_ideal(G, 100.0)
        .with_ideal(1, 100.0)
        .with_start(G, 4.0)
        .with_recipe(Recipe::new().consume(G, 2.0, 1.0).produce(1, 5.0))
        .with_recipe(Recipe::new().consume(G, 1.0, 1.0).produce(1, 1.0));
    let mut world = World::new(Catalog::new(goods, vec![baker]).unwrap(), MarketConfig::default())
        .unwrap();
    let id = world.spawn(0, 1, 10.0).unwrap()[0];

    world.advance_tick();

    let agent = world.agent(id).unwrap();
    assert_eq!(agent.quantity(G), 2.0, "first recipe consumed 2");
    assert_eq!(agent.quantity(1), 5.0, "first recipe produced 5");
    assert_eq!(world.last_report().produced, 1);
}

#[test]
fn scenario_variable_recipe_scales_to_stock() {
    let goods = vec![GoodDef::new("Wood", 0.5), GoodDef::new("Plank", 1.0)];
    let sawmill = Archetype::new("Sawmill", 2)
        .with_start(0, 3.0)
        .with_recipe(Recipe::new().consume(0, -10.0, 1.0).produce(1, -2.0));
    let mut world =
        World::new(Catalog::new(goods, vec![sawmill]).unwrap(), MarketConfig::default()).unwrap();
    let id = world.spawn(0, 1, 10.0).unwrap()[0];

    world.advance_tick();

    let agent = world.agent(id).unwrap();
    assert_eq!(agent.quantity(0), 0.0, "consumed all 3 of the up-to-10");
    assert_eq!(agent.quantity(1), 6.0, "output scaled by the same factor");
}

#[test]
fn scenario_bankrupt_agents_replaced_by_scarce_producer() {
    const FOOD: GoodId = 0;
    let goods = vec![GoodDef::new("Food", 1.0)];
    let farmer = Archetype::new("Farmer", 1)
        .with_start(FOOD, 1.0)
        .with_recipe(Recipe::new().produce(FOOD, 2.0));
    let eater = Archetype::new("Eater", 1)
        .with_ideal(FOOD, 10.0)
        .with_money_upkeep(1000.0);
    let mut world =
        World::new(Catalog::new(goods, vec![farmer, eater]).unwrap(), MarketConfig::default())
            .unwrap();
    world.spawn(0, 1, 50.0).unwrap();
    let eaters = world.spawn(1, 2, 50.0).unwrap();

    world.advance_tick();

    let report = world.last_report();
    assert_eq!(report.bankrupt.len(), 2);
    assert_eq!(report.spawned.len(), 2);
    let choice = report.replacement.expect("bankruptcies trigger a replacement");
    assert_eq!(choice.archetype, 0, "farmers dominate food production");
    assert!(matches!(
        choice.reason,
        ReplacementReason::Scarce { good: FOOD, .. }
    ));

    for id in eaters {
        assert!(world.agent(id).is_none());
    }
    assert_eq!(world.agents().census(2), vec![3, 0]);
    for &id in &world.last_report().spawned {
        let agent = world.agent(id).unwrap();
        assert_eq!(agent.money(), world.config().respawn_money);
        assert_eq!(agent.quantity(FOOD), 1.0, "starting template inventory");
    }
}

#[test]
fn scenario_catalog_from_json() {
    let json = r#"{
        "goods": [
            { "name": "Food", "initialCost": 1.0 },
            { "name": "Wood", "initialCost": 0.5 }
        ],
        "factories": [
            {
                "name": "Farmer",
                "costOfLiving": [{ "name": "Food", "quantity": 1 }],
                "limitGoods": [{ "name": "Food", "quantity": 20 }],
                "idealQuantity": [{ "name": "Food", "quantity": 3 }, { "name": "Wood", "quantity": 2 }],
                "startQuantity": [{ "name": "Food", "quantity": 5 }, { "name": "Wood", "quantity": 2 }],
                "possibleDeltas": [
                    {
                        "consumes": [{ "name": "Wood", "quantity": 1, "possibility": 0.5 }],
                        "produces": [{ "name": "Food", "quantity": 4 }]
                    }
                ]
            },
            {
                "name": "Woodcutter",
                "costOfLiving": [{ "name": "Food", "quantity": 1 }],
                "idealQuantity": [{ "name": "Food", "quantity": 3 }],
                "startQuantity": [{ "name": "Food", "quantity": 5 }],
                "possibleDeltas": [{ "produces": [{ "name": "Wood", "quantity": 2 }] }]
            }
        ]
    }"#;

    let catalog = CatalogDef::from_json(json).unwrap().resolve().unwrap();
    assert_eq!(catalog.dominant_producer(0), Some(0));
    assert_eq!(catalog.dominant_producer(1), Some(1));

    let mut world = World::from_json(json, MarketConfig::default()).unwrap();
    world.spawn_named("Farmer", 5, 20.0).unwrap();
    world.spawn_named("Woodcutter", 5, 20.0).unwrap();
    world.run(25);

    assert_eq!(world.tick, 25);
    assert_eq!(world.agents().len(), 10);
    assert_eq!(world.history().prices(0).len(), 26);

    let bad = json.replace(r#""name": "Wood", "quantity": 1, "possibility""#, r#""name": "Stone", "quantity": 1, "possibility""#);
    assert!(matches!(
        World::from_json(&bad, MarketConfig::default()),
        Err(SimError::Catalog(_))
    ));
}
