use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::farmer::Farmer;
use crate::domain::good::GoodId;
use crate::domain::player::Player;
use crate::negotiation::session::{NegotiationSession, SessionStatus, TradeSide};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("session {0} is not in committed status")]
    NotCommitted(String),
    #[error("session {0} was already settled")]
    AlreadySettled(String),
    #[error("committed session {0} carries no agreed terms")]
    MissingTerms(String),
    #[error("insufficient inventory of {good}: have {have}, deal needs {requested}")]
    InsufficientInventory { good: GoodId, have: u32, requested: u32 },
    #[error("insufficient funds: have {have}, deal needs {requested}")]
    InsufficientFunds { have: Decimal, requested: Decimal },
}

/// Receipt for an applied deal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub good: GoodId,
    pub side: TradeSide,
    pub unit_price: u32,
    pub quantity: u32,
    pub total: Decimal,
}

/// Apply a committed session to both parties, all-or-nothing.
///
/// Every precondition is re-checked against live state before anything
/// mutates, so an intervening state change rejects the whole deal instead
/// of half-applying it. The session is marked settled so a second call
/// cannot double-spend.
pub fn settle(
    session: &mut NegotiationSession,
    player: &mut Player,
    farmer: &mut Farmer,
) -> Result<Settlement, CommitError> {
    let session_id = session.id.0.to_string();
    if session.status != SessionStatus::Committed {
        return Err(CommitError::NotCommitted(session_id));
    }
    if session.settled {
        return Err(CommitError::AlreadySettled(session_id));
    }
    let (unit_price, quantity) =
        session.current_terms().ok_or(CommitError::MissingTerms(session_id))?;
    let total = Decimal::from(unit_price) * Decimal::from(quantity);
    let good = session.good.clone();

    // Validate everything up front; mutate only once nothing can fail.
    match session.side {
        TradeSide::PlayerBuys => {
            let stock = farmer.inventory.quantity_of(&good);
            if stock < quantity {
                return Err(CommitError::InsufficientInventory {
                    good,
                    have: stock,
                    requested: quantity,
                });
            }
            if player.funds < total {
                return Err(CommitError::InsufficientFunds {
                    have: player.funds,
                    requested: total,
                });
            }
            farmer
                .inventory
                .debit(&good, quantity)
                .map_err(|_| CommitError::InsufficientInventory {
                    good: good.clone(),
                    have: stock,
                    requested: quantity,
                })?;
            player.inventory.credit(&good, quantity);
            player.funds -= total;
            farmer.funds += total;
        }
        TradeSide::PlayerSells => {
            let stock = player.inventory.quantity_of(&good);
            if stock < quantity {
                return Err(CommitError::InsufficientInventory {
                    good,
                    have: stock,
                    requested: quantity,
                });
            }
            if farmer.funds < total {
                return Err(CommitError::InsufficientFunds {
                    have: farmer.funds,
                    requested: total,
                });
            }
            player
                .inventory
                .debit(&good, quantity)
                .map_err(|_| CommitError::InsufficientInventory {
                    good: good.clone(),
                    have: stock,
                    requested: quantity,
                })?;
            farmer.inventory.credit(&good, quantity);
            farmer.funds -= total;
            player.funds += total;
        }
    }

    session.settled = true;
    Ok(Settlement { good: session.good.clone(), side: session.side, unit_price, quantity, total })
}
