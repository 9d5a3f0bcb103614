use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::inventory::Inventory;
use crate::world::map::LocationId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub location: LocationId,
    pub inventory: Inventory,
    pub funds: Decimal,
}

impl Player {
    pub fn new(location: LocationId, starting_funds: Decimal) -> Self {
        Self { location, inventory: Inventory::new(), funds: starting_funds }
    }

    pub fn print_funds(&self) -> String {
        format!("${:.2}", self.funds)
    }
}
