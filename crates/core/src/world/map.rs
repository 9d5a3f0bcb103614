use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::farmer::{Farmer, FarmerId};
use crate::domain::good::Good;
use crate::domain::player::Player;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationId(pub String);

impl LocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node in the world graph. Positions live on the unit square; travel
/// cost grows with the square of straight-line distance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub position: (f64, f64),
}

impl Location {
    pub fn distance_to(&self, other: &Location) -> f64 {
        let dx = self.position.0 - other.position.0;
        let dy = self.position.1 - other.position.1;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum WorldError {
    #[error("unknown location {0}")]
    UnknownLocation(LocationId),
    #[error("unknown farmer {0}")]
    UnknownFarmer(FarmerId),
    #[error("already at {0}")]
    AlreadyAt(LocationId),
    #[error("travel to {destination} costs {cost}, player holds {have}")]
    UnaffordableTravel { destination: LocationId, cost: Decimal, have: Decimal },
}

/// The game world: catalog, map, farmers, the single player, and the day
/// counter that wraps at the end of each year.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct World {
    pub catalog: Vec<Good>,
    pub locations: Vec<Location>,
    pub farmers: Vec<Farmer>,
    pub player: Player,
    pub day: u32,
    pub year_length: u32,
    pub travel_cost_multiplier: Decimal,
}

impl World {
    pub fn location(&self, id: &LocationId) -> Option<&Location> {
        self.locations.iter().find(|location| &location.id == id)
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.location(&self.player.location)
    }

    pub fn farmer(&self, id: &FarmerId) -> Option<&Farmer> {
        self.farmers.iter().find(|farmer| &farmer.id == id)
    }

    pub fn farmers_at(&self, location: &LocationId) -> Vec<&Farmer> {
        self.farmers.iter().filter(|farmer| &farmer.location == location).collect()
    }

    /// Mutable access to both trade parties at once, for settlement.
    pub fn trade_parties_mut(
        &mut self,
        farmer_id: &FarmerId,
    ) -> Result<(&mut Player, &mut Farmer), WorldError> {
        let farmer = self
            .farmers
            .iter_mut()
            .find(|farmer| &farmer.id == farmer_id)
            .ok_or_else(|| WorldError::UnknownFarmer(farmer_id.clone()))?;
        Ok((&mut self.player, farmer))
    }

    pub fn travel_cost(&self, to: &LocationId) -> Result<Decimal, WorldError> {
        let origin = self
            .location(&self.player.location)
            .ok_or_else(|| WorldError::UnknownLocation(self.player.location.clone()))?;
        let destination =
            self.location(to).ok_or_else(|| WorldError::UnknownLocation(to.clone()))?;
        let distance = origin.distance_to(destination);
        let squared = Decimal::from_f64_retain(distance * distance).unwrap_or_default();
        Ok((self.travel_cost_multiplier * squared).round_dp(2))
    }

    /// Move the player, deducting the travel cost from their funds and
    /// advancing the day. Fails without mutating anything if the player
    /// cannot pay.
    pub fn move_player(&mut self, to: &LocationId) -> Result<Decimal, WorldError> {
        if &self.player.location == to {
            return Err(WorldError::AlreadyAt(to.clone()));
        }
        let cost = self.travel_cost(to)?;
        if cost > self.player.funds {
            return Err(WorldError::UnaffordableTravel {
                destination: to.clone(),
                cost,
                have: self.player.funds,
            });
        }
        self.player.funds -= cost;
        self.player.location = to.clone();
        self.advance_day();
        Ok(cost)
    }

    pub fn advance_day(&mut self) {
        self.day = (self.day + 1) % self.year_length.max(1);
    }

    /// Closest destinations first, paired with their travel cost.
    pub fn nearest_locations(&self, limit: usize) -> Vec<(&Location, Decimal)> {
        let Some(origin) = self.current_location() else {
            return Vec::new();
        };
        let mut candidates: Vec<&Location> =
            self.locations.iter().filter(|location| location.id != origin.id).collect();
        candidates.sort_by(|a, b| {
            origin
                .distance_to(a)
                .partial_cmp(&origin.distance_to(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
            .into_iter()
            .take(limit)
            .map(|location| {
                let cost = self.travel_cost(&location.id).unwrap_or_default();
                (location, cost)
            })
            .collect()
    }
}
