use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::good::GoodId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("insufficient stock of {good}: have {have}, requested {requested}")]
    InsufficientStock { good: GoodId, have: u32, requested: u32 },
}

/// Quantity-per-good holding. Quantities can never go negative: the only
/// way to remove stock is `debit`, which refuses overdraws.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    quantities: BTreeMap<GoodId, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quantity_of(&self, good: &GoodId) -> u32 {
        self.quantities.get(good).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, good: &GoodId, quantity: u32) {
        let entry = self.quantities.entry(good.clone()).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    pub fn debit(&mut self, good: &GoodId, quantity: u32) -> Result<(), InventoryError> {
        let have = self.quantity_of(good);
        if have < quantity {
            return Err(InventoryError::InsufficientStock {
                good: good.clone(),
                have,
                requested: quantity,
            });
        }
        self.quantities.insert(good.clone(), have - quantity);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.values().all(|quantity| *quantity == 0)
    }

    /// Goods currently in stock, with quantities, in stable id order.
    pub fn stocked(&self) -> impl Iterator<Item = (&GoodId, u32)> {
        self.quantities.iter().filter(|(_, quantity)| **quantity > 0).map(|(id, q)| (id, *q))
    }
}
