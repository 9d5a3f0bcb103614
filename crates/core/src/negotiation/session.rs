use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::farmer::FarmerId;
use crate::domain::good::GoodId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    /// Goods flow farmer -> player, funds flow player -> farmer.
    PlayerBuys,
    /// Goods flow player -> farmer, funds flow farmer -> player.
    PlayerSells,
}

/// Structured reading of one model reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ParsedIntent {
    MakeOffer { price: u32, quantity: u32 },
    CounterOffer { price: u32, quantity: u32 },
    Accept,
    /// Declines the proposal on the table but keeps negotiating.
    Reject,
    /// Walks away from the negotiation entirely.
    Refuse,
    Unparseable { raw: String },
}

impl ParsedIntent {
    pub fn terms(&self) -> Option<(u32, u32)> {
        match self {
            Self::MakeOffer { price, quantity } | Self::CounterOffer { price, quantity } => {
                Some((*price, *quantity))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Player,
    Farmer,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub intent: Option<ParsedIntent>,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    PlayerTurn,
    AwaitingModel,
    Committed,
    Aborted,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    FarmerRefused,
    Unparseable,
    IllegalAcceptedTerms,
    SettlementFailed,
    Stalled,
}

impl AbortReason {
    /// In-character line shown to the player when a session aborts.
    pub fn narrative(self) -> &'static str {
        match self {
            Self::FarmerRefused => "The farmer shakes their head. No deal today.",
            Self::Unparseable => "The farmer mutters something you can't make sense of and turns away.",
            Self::IllegalAcceptedTerms => "At the handshake the numbers don't add up. The deal falls through.",
            Self::SettlementFailed => "When it comes time to pay, the deal falls apart.",
            Self::Stalled => "The haggling drags on too long. The farmer loses interest.",
        }
    }
}

/// One bounded negotiation between the player and a single farmer over a
/// single good. The farmer, good, and side are fixed at creation; the
/// transcript is append-only; the status reaches a terminal value exactly
/// once, after which the session is discarded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub id: SessionId,
    pub farmer: FarmerId,
    pub good: GoodId,
    pub side: TradeSide,
    pub status: SessionStatus,
    pub proposed_price: Option<u32>,
    pub proposed_quantity: Option<u32>,
    pub turn: u32,
    pub unparseable_streak: u32,
    pub abort_reason: Option<AbortReason>,
    pub settled: bool,
    pub transcript: Vec<TranscriptEntry>,
    pub created_at: DateTime<Utc>,
}

impl NegotiationSession {
    pub fn new(farmer: FarmerId, good: GoodId, side: TradeSide) -> Self {
        Self {
            id: SessionId::generate(),
            farmer,
            good,
            side,
            status: SessionStatus::Open,
            proposed_price: None,
            proposed_quantity: None,
            turn: 0,
            unparseable_streak: 0,
            abort_reason: None,
            settled: false,
            transcript: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn current_terms(&self) -> Option<(u32, u32)> {
        Some((self.proposed_price?, self.proposed_quantity?))
    }

    pub fn record(&mut self, speaker: Speaker, text: impl Into<String>, intent: Option<ParsedIntent>) {
        self.transcript.push(TranscriptEntry {
            speaker,
            text: text.into(),
            intent,
            at: Utc::now(),
        });
    }

    pub fn last_player_utterance(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|entry| entry.speaker == Speaker::Player)
            .map(|entry| entry.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::farmer::FarmerId;
    use crate::domain::good::GoodId;

    use super::{NegotiationSession, ParsedIntent, SessionStatus, Speaker, TradeSide};

    fn session() -> NegotiationSession {
        NegotiationSession::new(FarmerId::new("f-1"), GoodId::new("apples"), TradeSide::PlayerBuys)
    }

    #[test]
    fn new_session_starts_open_with_no_terms() {
        let session = session();
        assert_eq!(session.status, SessionStatus::Open);
        assert_eq!(session.current_terms(), None);
        assert!(session.transcript.is_empty());
    }

    #[test]
    fn transcript_is_append_only_and_ordered() {
        let mut session = session();
        session.record(Speaker::Player, "give me five apples for 8 each", None);
        session.record(
            Speaker::Farmer,
            "seven and we have a deal",
            Some(ParsedIntent::CounterOffer { price: 7, quantity: 5 }),
        );

        assert_eq!(session.transcript.len(), 2);
        assert_eq!(session.transcript[0].speaker, Speaker::Player);
        assert_eq!(session.last_player_utterance(), Some("give me five apples for 8 each"));
    }

    #[test]
    fn terminal_statuses_are_flagged() {
        assert!(SessionStatus::Committed.is_terminal());
        assert!(SessionStatus::Aborted.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::PlayerTurn.is_terminal());
        assert!(!SessionStatus::AwaitingModel.is_terminal());
    }

    #[test]
    fn intent_terms_only_exist_for_offers() {
        assert_eq!(ParsedIntent::MakeOffer { price: 8, quantity: 5 }.terms(), Some((8, 5)));
        assert_eq!(ParsedIntent::Accept.terms(), None);
        assert_eq!(ParsedIntent::Unparseable { raw: "hm".to_string() }.terms(), None);
    }
}
