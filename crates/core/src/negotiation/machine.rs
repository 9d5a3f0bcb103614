use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::farmer::Farmer;
use crate::domain::good::GoodId;
use crate::domain::player::Player;
use crate::negotiation::session::{
    AbortReason, NegotiationSession, ParsedIntent, SessionStatus, TradeSide,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Session creation handshake.
    Opened,
    /// The player submitted an utterance to forward to the model, carrying
    /// any terms read out of it.
    PlayerUttered { terms: Option<(u32, u32)> },
    /// A parsed model reply arrived.
    ModelReplied(ParsedIntent),
    /// The player withdrew from the negotiation.
    PlayerWithdrew,
}

/// Follow-up work the caller owes after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionAction {
    QueryModel,
    AwaitPlayer,
    SettleDeal,
    Discard,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub actions: Vec<SessionAction>,
}

/// Live inventory/funds snapshot used to re-check an accepted deal.
/// Parse validity never implies game validity; this is the second gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegalityContext {
    pub farmer_stock: u32,
    pub farmer_funds: Decimal,
    pub player_stock: u32,
    pub player_funds: Decimal,
}

impl LegalityContext {
    pub fn snapshot(player: &Player, farmer: &Farmer, good: &GoodId) -> Self {
        Self {
            farmer_stock: farmer.inventory.quantity_of(good),
            farmer_funds: farmer.funds,
            player_stock: player.inventory.quantity_of(good),
            player_funds: player.funds,
        }
    }

    fn permits(&self, side: TradeSide, price: u32, quantity: u32) -> bool {
        if price == 0 || quantity == 0 {
            return false;
        }
        let total = Decimal::from(price) * Decimal::from(quantity);
        match side {
            TradeSide::PlayerBuys => quantity <= self.farmer_stock && total <= self.player_funds,
            TradeSide::PlayerSells => quantity <= self.player_stock && total <= self.farmer_funds,
        }
    }
}

/// Tunable abort policy. The turn cap and unparseable budget are
/// configuration, not hard-coded rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationPolicy {
    /// Consecutive unparseable model replies tolerated before aborting.
    pub unparseable_budget: u32,
    /// Optional cap on player turns; `None` leaves the session unbounded.
    pub max_turns: Option<u32>,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self { unparseable_budget: 2, max_turns: None }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionTransitionError {
    #[error("invalid transition from {status:?} on {event}")]
    InvalidTransition { status: SessionStatus, event: String },
    #[error("session already reached terminal status {status:?}")]
    SessionClosed { status: SessionStatus },
}

#[derive(Clone, Debug, Default)]
pub struct NegotiationMachine {
    policy: NegotiationPolicy,
}

impl NegotiationMachine {
    pub fn new(policy: NegotiationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &NegotiationPolicy {
        &self.policy
    }

    /// Apply one event to the session, mutating its status and terms.
    /// Terminal sessions reject every further event, which is what makes
    /// "exactly one terminal transition" hold.
    pub fn apply(
        &self,
        session: &mut NegotiationSession,
        event: SessionEvent,
        legality: &LegalityContext,
    ) -> Result<TransitionOutcome, SessionTransitionError> {
        let from = session.status;
        if from.is_terminal() {
            return Err(SessionTransitionError::SessionClosed { status: from });
        }

        let (to, actions) = match (from, &event) {
            (SessionStatus::Open, SessionEvent::Opened) => {
                (SessionStatus::PlayerTurn, vec![SessionAction::AwaitPlayer])
            }
            (SessionStatus::PlayerTurn, SessionEvent::PlayerUttered { terms }) => {
                let next_turn = session.turn.saturating_add(1);
                if self.policy.max_turns.is_some_and(|cap| next_turn > cap) {
                    session.abort_reason = Some(AbortReason::Stalled);
                    (SessionStatus::Aborted, vec![SessionAction::Discard])
                } else {
                    session.turn = next_turn;
                    // The player's own proposal goes on the table, so a bare
                    // accept from the model has concrete terms to commit.
                    if let Some((price, quantity)) = *terms {
                        session.proposed_price = Some(price);
                        session.proposed_quantity = Some(quantity);
                    }
                    (SessionStatus::AwaitingModel, vec![SessionAction::QueryModel])
                }
            }
            (SessionStatus::AwaitingModel, SessionEvent::ModelReplied(intent)) => {
                self.on_model_reply(session, intent, legality)
            }
            (_, SessionEvent::PlayerWithdrew) => {
                (SessionStatus::Cancelled, vec![SessionAction::Discard])
            }
            _ => {
                return Err(SessionTransitionError::InvalidTransition {
                    status: from,
                    event: describe_event(&event),
                });
            }
        };

        session.status = to;
        Ok(TransitionOutcome { from, to, actions })
    }

    fn on_model_reply(
        &self,
        session: &mut NegotiationSession,
        intent: &ParsedIntent,
        legality: &LegalityContext,
    ) -> (SessionStatus, Vec<SessionAction>) {
        match intent {
            ParsedIntent::MakeOffer { price, quantity }
            | ParsedIntent::CounterOffer { price, quantity } => {
                session.unparseable_streak = 0;
                // A counter that echoes the standing proposal is agreement in
                // everything but the keyword; treat it as an accept so two
                // stubborn parties cannot loop forever.
                if session.current_terms() == Some((*price, *quantity)) {
                    return self.on_accept(session, legality);
                }
                session.proposed_price = Some(*price);
                session.proposed_quantity = Some(*quantity);
                (SessionStatus::PlayerTurn, vec![SessionAction::AwaitPlayer])
            }
            ParsedIntent::Accept => self.on_accept(session, legality),
            ParsedIntent::Reject => {
                session.unparseable_streak = 0;
                (SessionStatus::PlayerTurn, vec![SessionAction::AwaitPlayer])
            }
            ParsedIntent::Refuse => {
                session.abort_reason = Some(AbortReason::FarmerRefused);
                (SessionStatus::Aborted, vec![SessionAction::Discard])
            }
            ParsedIntent::Unparseable { .. } => {
                session.unparseable_streak = session.unparseable_streak.saturating_add(1);
                if session.unparseable_streak >= self.policy.unparseable_budget {
                    session.abort_reason = Some(AbortReason::Unparseable);
                    (SessionStatus::Aborted, vec![SessionAction::Discard])
                } else {
                    (SessionStatus::PlayerTurn, vec![SessionAction::AwaitPlayer])
                }
            }
        }
    }

    fn on_accept(
        &self,
        session: &mut NegotiationSession,
        legality: &LegalityContext,
    ) -> (SessionStatus, Vec<SessionAction>) {
        session.unparseable_streak = 0;
        let legal = session
            .current_terms()
            .is_some_and(|(price, quantity)| legality.permits(session.side, price, quantity));
        if legal {
            (SessionStatus::Committed, vec![SessionAction::SettleDeal])
        } else {
            session.abort_reason = Some(AbortReason::IllegalAcceptedTerms);
            (SessionStatus::Aborted, vec![SessionAction::Discard])
        }
    }
}

fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Opened => "opened".to_string(),
        SessionEvent::PlayerUttered { .. } => "player_uttered".to_string(),
        SessionEvent::ModelReplied(intent) => format!("model_replied({intent:?})"),
        SessionEvent::PlayerWithdrew => "player_withdrew".to_string(),
    }
}
