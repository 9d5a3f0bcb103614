use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::domain::farmer::{Disposition, Farmer, FarmerId, Temperament};
use crate::domain::good::Good;
use crate::domain::inventory::Inventory;
use crate::domain::player::Player;
use crate::world::map::{Location, LocationId, World};

const LOCATION_NAMES: &[&str] = &[
    "Milbrook", "Harlow Fen", "Dunmore", "Caswick", "Ashcombe", "Tarrow", "Eastmarsh",
    "Briarholt", "Weywick", "Foxgill", "Netherfield", "Coldbarrow", "Larkstead", "Ormsby",
    "Thistlemoor", "Redford", "Gorseton", "Hollowell", "Pellbrook", "Stanhope",
];

const FIRST_NAMES: &[&str] = &[
    "Ada", "Orrin", "Maeve", "Silas", "Tamsin", "Jorah", "Petra", "Calder", "Ines", "Bram",
    "Rosalind", "Edmund", "Greta", "Howell", "Sable", "Colm",
];

const LAST_NAMES: &[&str] = &[
    "Whitfield", "Hale", "Croft", "Thatcher", "Marlow", "Fenwick", "Dray", "Aldous",
    "Sorrel", "Pickett", "Harrow", "Quill", "Bixby", "Larch",
];

const TEMPERAMENTS: &[Temperament] = &[
    Temperament::Gruff,
    Temperament::Cheerful,
    Temperament::Shrewd,
    Temperament::Skeptical,
    Temperament::Weary,
];

/// Knobs for seeded world generation. Defaults follow the original game's
/// tuning: up to four farmers per location, ~10% price spread, starting
/// farmer funds between 10x and 30x daily production value.
#[derive(Clone, Debug)]
pub struct GenerationParams {
    pub n_locations: usize,
    pub max_farmers_per_location: u32,
    pub farmer_arrival_p: f64,
    pub lower_money_multiplier: f64,
    pub upper_money_multiplier: f64,
    pub year_length: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            n_locations: 12,
            max_farmers_per_location: 4,
            farmer_arrival_p: 0.33,
            lower_money_multiplier: 10.0,
            upper_money_multiplier: 30.0,
            year_length: 100,
        }
    }
}

/// Build a deterministic world from a seed. The same seed, catalog, and
/// params always produce the same map, farmers, and dispositions.
pub fn generate_world(
    seed: u64,
    catalog: Vec<Good>,
    starting_funds: Decimal,
    travel_cost_multiplier: Decimal,
    params: &GenerationParams,
) -> World {
    let mut rng = StdRng::seed_from_u64(seed);

    let locations = generate_locations(&mut rng, params.n_locations);
    let mut farmers = Vec::new();
    for location in &locations {
        let count = geometric_capped(&mut rng, params.farmer_arrival_p, params.max_farmers_per_location);
        for _ in 0..count {
            farmers.push(generate_farmer(&mut rng, &catalog, &location.id, farmers.len(), params));
        }
    }

    let start = locations
        .first()
        .map(|location| location.id.clone())
        .unwrap_or_else(|| LocationId::new("loc-0"));

    World {
        catalog,
        locations,
        farmers,
        player: Player::new(start, starting_funds),
        day: 0,
        year_length: params.year_length,
        travel_cost_multiplier,
    }
}

fn generate_locations(rng: &mut StdRng, count: usize) -> Vec<Location> {
    let mut names: Vec<&str> = LOCATION_NAMES.to_vec();
    names.shuffle(rng);
    names
        .into_iter()
        .take(count.min(LOCATION_NAMES.len()))
        .enumerate()
        .map(|(index, name)| Location {
            id: LocationId::new(format!("loc-{index}")),
            name: name.to_string(),
            position: (rng.gen::<f64>(), rng.gen::<f64>()),
        })
        .collect()
}

/// Number of farmers settling at a location: a geometric draw capped at
/// `max`, as in the original tuning (min(4, geometric(0.33))).
fn geometric_capped(rng: &mut StdRng, p: f64, max: u32) -> u32 {
    let mut count = 1;
    while count < max && rng.gen::<f64>() >= p {
        count += 1;
    }
    count
}

fn generate_farmer(
    rng: &mut StdRng,
    catalog: &[Good],
    location: &LocationId,
    ordinal: usize,
    params: &GenerationParams,
) -> Farmer {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Ada");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Hale");

    // Each farmer specializes in one to three goods; stock accumulates a
    // notional ten days of production weighted by specialization.
    let mut goods: Vec<&Good> = catalog.iter().collect();
    goods.shuffle(rng);
    let n_goods = rng.gen_range(1..=goods.len().min(3));
    let mut inventory = Inventory::new();
    let mut daily_production_value = Decimal::ZERO;
    for good in goods.iter().take(n_goods) {
        let weight: f64 = rng.gen_range(0.3..1.0);
        let stock = ((weight * 20.0).round() as u32).saturating_add(rng.gen_range(0..=5)).max(1);
        inventory.credit(&good.id, stock);
        daily_production_value +=
            good.base_price * Decimal::from_f64_retain(weight).unwrap_or_default();
    }

    let multiplier = params.lower_money_multiplier
        + (params.upper_money_multiplier - params.lower_money_multiplier) * rng.gen::<f64>();
    let funds = (daily_production_value * Decimal::from_f64_retain(multiplier).unwrap_or_default())
        .round_dp(2)
        .max(Decimal::ONE);

    let temperament = TEMPERAMENTS.choose(rng).copied().unwrap_or(Temperament::Gruff);
    let spread = Decimal::from_f64_retain(0.05 + 0.1 * rng.gen::<f64>())
        .unwrap_or_default()
        .round_dp(2);

    Farmer {
        id: FarmerId::new(format!("farmer-{ordinal}")),
        name: format!("{first} {last}"),
        location: location.clone(),
        disposition: Disposition { temperament, spread, patience: rng.gen_range(1..=5) },
        inventory,
        funds,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::good::default_catalog;

    use super::{generate_world, GenerationParams};

    fn world(seed: u64) -> crate::world::map::World {
        generate_world(
            seed,
            default_catalog(),
            Decimal::from(10),
            Decimal::from(2),
            &GenerationParams::default(),
        )
    }

    #[test]
    fn same_seed_produces_identical_worlds() {
        let first = world(134);
        let second = world(134);

        assert_eq!(first.locations, second.locations);
        assert_eq!(first.farmers, second.farmers);
        assert_eq!(first.player, second.player);
    }

    #[test]
    fn different_seeds_diverge() {
        let first = world(134);
        let second = world(135);
        assert_ne!(first.farmers, second.farmers);
    }

    #[test]
    fn every_location_hosts_between_one_and_four_farmers() {
        let world = world(7);
        for location in &world.locations {
            let count = world.farmers_at(&location.id).len();
            assert!(
                (1..=4).contains(&count),
                "{} hosts {count} farmers, expected 1..=4",
                location.name
            );
        }
    }

    #[test]
    fn farmers_start_stocked_and_funded() {
        let world = world(42);
        for farmer in &world.farmers {
            assert!(!farmer.inventory.is_empty(), "{} has no stock", farmer.name);
            assert!(farmer.funds > Decimal::ZERO, "{} has no funds", farmer.name);
            assert!(farmer.disposition.spread > Decimal::ZERO);
            assert!((1..=5).contains(&farmer.disposition.patience));
        }
    }

    #[test]
    fn player_starts_at_the_first_location_with_configured_funds() {
        let world = world(1);
        assert_eq!(world.player.location, world.locations[0].id);
        assert_eq!(world.player.funds, Decimal::from(10));
    }
}
