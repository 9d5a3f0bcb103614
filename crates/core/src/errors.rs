use thiserror::Error;

use crate::domain::inventory::InventoryError;
use crate::negotiation::machine::SessionTransitionError;
use crate::negotiation::settle::CommitError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    SessionTransition(#[from] SessionTransitionError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("completion transport failure: {0}")]
    Transport(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("internal precondition violated: {0}")]
    Precondition(String),
}

impl ApplicationError {
    /// Player-facing phrasing for recoverable failures. Technical detail
    /// stays in logs; the game narrates everything else in character.
    pub fn narrative(&self) -> &'static str {
        match self {
            Self::Domain(_) => "The deal falls through.",
            Self::Transport(_) => "The farmer seems distracted. Try again in a moment.",
            Self::Configuration(_) | Self::Precondition(_) => {
                "Something has gone wrong behind the scenes."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, DomainError};

    #[test]
    fn transport_failure_has_in_character_narrative() {
        let error = ApplicationError::Transport("connection refused".to_string());
        assert_eq!(error.narrative(), "The farmer seems distracted. Try again in a moment.");
    }

    #[test]
    fn domain_failure_narrates_deal_collapse() {
        let error =
            ApplicationError::from(DomainError::InvariantViolation("negative stock".to_string()));
        assert_eq!(error.narrative(), "The deal falls through.");
    }
}
