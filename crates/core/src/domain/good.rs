use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GoodId(pub String);

impl GoodId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for GoodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable catalog entry for a tradeable good.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Good {
    pub id: GoodId,
    pub display_name: String,
    pub base_price: Decimal,
    pub unit: String,
}

impl Good {
    pub fn new(
        id: &str,
        display_name: &str,
        base_price: Decimal,
        unit: &str,
    ) -> Self {
        Self {
            id: GoodId::new(id),
            display_name: display_name.to_string(),
            base_price,
            unit: unit.to_string(),
        }
    }
}

/// The fixed five-good catalog the world trades in.
pub fn default_catalog() -> Vec<Good> {
    vec![
        Good::new("wheat", "Wheat", Decimal::new(10, 2), "bushel"),
        Good::new("corn", "Corn", Decimal::new(25, 2), "bushel"),
        Good::new("apples", "Apples", Decimal::new(50, 2), "crate"),
        Good::new("milk", "Milk", Decimal::new(150, 2), "jug"),
        Good::new("steak", "Steak", Decimal::new(500, 2), "cut"),
    ]
}

pub fn find_good<'a>(catalog: &'a [Good], id: &GoodId) -> Option<&'a Good> {
    catalog.iter().find(|good| &good.id == id)
}
