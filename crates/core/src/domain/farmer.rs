use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::good::Good;
use crate::domain::inventory::Inventory;
use crate::world::map::LocationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FarmerId(pub String);

impl FarmerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for FarmerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temperament {
    Gruff,
    Cheerful,
    Shrewd,
    Skeptical,
    Weary,
}

/// Prompt-shaping parameters. Immutable for the lifetime of a farmer and
/// consumed only when building prompts; game rules never branch on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Disposition {
    pub temperament: Temperament,
    /// Fractional margin applied around the base price when quoting.
    pub spread: Decimal,
    /// How many low offers the persona tolerates before souring, 1..=5.
    pub patience: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Farmer {
    pub id: FarmerId,
    pub name: String,
    pub location: LocationId,
    pub disposition: Disposition,
    pub inventory: Inventory,
    pub funds: Decimal,
}

impl Farmer {
    /// Asking price when the player buys: base price marked up by spread.
    pub fn buy_price(&self, good: &Good) -> Decimal {
        (good.base_price * (Decimal::ONE + self.disposition.spread)).round_dp(2)
    }

    /// Offered price when the player sells: base price marked down by spread.
    pub fn sell_price(&self, good: &Good) -> Decimal {
        (good.base_price * (Decimal::ONE - self.disposition.spread)).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::good::Good;
    use crate::domain::inventory::Inventory;
    use crate::world::map::LocationId;

    use super::{Disposition, Farmer, FarmerId, Temperament};

    fn farmer(spread: Decimal) -> Farmer {
        Farmer {
            id: FarmerId::new("f-1"),
            name: "Ada Whitfield".to_string(),
            location: LocationId::new("loc-1"),
            disposition: Disposition { temperament: Temperament::Shrewd, spread, patience: 3 },
            inventory: Inventory::new(),
            funds: Decimal::new(10_000, 2),
        }
    }

    #[test]
    fn spread_marks_buy_price_up_and_sell_price_down() {
        let good = Good::new("milk", "Milk", Decimal::new(150, 2), "jug");
        let farmer = farmer(Decimal::new(10, 2));

        assert_eq!(farmer.buy_price(&good), Decimal::new(165, 2));
        assert_eq!(farmer.sell_price(&good), Decimal::new(135, 2));
    }

    #[test]
    fn zero_spread_quotes_base_price_both_ways() {
        let good = Good::new("corn", "Corn", Decimal::new(25, 2), "bushel");
        let farmer = farmer(Decimal::ZERO);

        assert_eq!(farmer.buy_price(&good), good.base_price);
        assert_eq!(farmer.sell_price(&good), good.base_price);
    }
}
