use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use haggle_core::domain::farmer::Farmer;
use haggle_core::domain::good::Good;
use haggle_core::domain::player::Player;
use haggle_core::errors::{ApplicationError, DomainError};
use haggle_core::negotiation::machine::{
    LegalityContext, NegotiationMachine, NegotiationPolicy, SessionAction, SessionEvent,
};
use haggle_core::negotiation::session::{
    AbortReason, NegotiationSession, ParsedIntent, SessionStatus, Speaker, TradeSide,
};
use haggle_core::negotiation::settle::{settle, Settlement};

use crate::llm::{CompletionClient, SeedSequence, TransportError};
use crate::parser::{parse_player_offer, parse_reply};
use crate::prompt::{PromptBuilder, PromptError};

/// What one driven turn produced, for the caller to narrate.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    /// The farmer replied and the negotiation continues.
    FarmerReplied { text: String, intent: ParsedIntent },
    /// The farmer accepted and the deal applied to both ledgers.
    Settled { text: String, settlement: Settlement },
    /// The session reached an abort terminal.
    SessionAborted { reason: AbortReason, text: Option<String> },
    /// The player withdrew; any in-flight reply was discarded.
    Withdrawn,
    /// The transport retry budget ran out. The session stays live and the
    /// pending model turn can be resumed with another `submit`.
    Distracted,
}

/// Cancels the negotiation from outside the turn in progress. A late model
/// reply arriving after cancellation is dropped, never applied.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Drives at most one negotiation session at a time: builds prompts,
/// queries the model, parses replies, feeds the state machine, and settles
/// committed deals. Owns the session slot so nothing else can mutate a
/// session mid-turn.
pub struct Negotiator<C> {
    client: C,
    prompts: PromptBuilder,
    machine: NegotiationMachine,
    catalog: Vec<Good>,
    session: Option<NegotiationSession>,
    seeds: SeedSequence,
    max_retries: u32,
    model_deadline: Duration,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl<C: CompletionClient> Negotiator<C> {
    pub fn new(
        client: C,
        catalog: Vec<Good>,
        policy: NegotiationPolicy,
        max_retries: u32,
        model_deadline_secs: u64,
    ) -> Result<Self, PromptError> {
        let (cancel_tx, _) = watch::channel(false);
        Ok(Self {
            client,
            prompts: PromptBuilder::new()?,
            machine: NegotiationMachine::new(policy),
            catalog,
            session: None,
            seeds: SeedSequence::from_seed(0),
            max_retries,
            model_deadline: Duration::from_secs(model_deadline_secs),
            cancel_tx: Arc::new(cancel_tx),
        })
    }

    pub fn session(&self) -> Option<&NegotiationSession> {
        self.session.as_ref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { tx: Arc::clone(&self.cancel_tx) }
    }

    /// Start a session against one farmer over one good. Refuses while a
    /// previous session is still live.
    pub fn open(
        &mut self,
        farmer: &Farmer,
        good: &Good,
        side: TradeSide,
        player: &Player,
    ) -> Result<(), ApplicationError> {
        if self.session.as_ref().is_some_and(|session| !session.status.is_terminal()) {
            return Err(ApplicationError::Precondition(
                "a negotiation session is already in progress".to_string(),
            ));
        }

        let mut session = NegotiationSession::new(farmer.id.clone(), good.id.clone(), side);
        let legality = LegalityContext::snapshot(player, farmer, &good.id);
        self.machine
            .apply(&mut session, SessionEvent::Opened, &legality)
            .map_err(DomainError::from)
            .map_err(ApplicationError::from)?;

        self.cancel_tx.send_replace(false);
        self.seeds = SeedSequence::for_farmer(&farmer.name);
        info!(session = %session.id.0, farmer = %farmer.id, good = %good.id, "session opened");
        self.session = Some(session);
        Ok(())
    }

    /// Run one negotiation turn: record the utterance, query the model, and
    /// apply the parsed reply. When the previous turn ended `Distracted`,
    /// the pending model turn resumes and `utterance` is ignored.
    pub async fn submit(
        &mut self,
        utterance: &str,
        player: &mut Player,
        farmer: &mut Farmer,
        good: &Good,
    ) -> Result<TurnOutcome, ApplicationError> {
        let session = self.session.as_mut().ok_or_else(|| {
            ApplicationError::Precondition("no negotiation session is open".to_string())
        })?;

        match session.status {
            SessionStatus::PlayerTurn => {
                // Terms the player names become the proposal on the table, so
                // the farmer can accept them outright.
                let offer = parse_player_offer(utterance);
                let terms = offer.as_ref().and_then(|intent| intent.terms());
                session.record(Speaker::Player, utterance, offer);
                let legality = LegalityContext::snapshot(player, farmer, &session.good);
                let outcome = self
                    .machine
                    .apply(session, SessionEvent::PlayerUttered { terms }, &legality)
                    .map_err(DomainError::from)
                    .map_err(ApplicationError::from)?;
                if outcome.to == SessionStatus::Aborted {
                    let reason = session.abort_reason.unwrap_or(AbortReason::Stalled);
                    return Ok(TurnOutcome::SessionAborted { reason, text: None });
                }
            }
            SessionStatus::AwaitingModel => {
                debug!(session = %session.id.0, "resuming pending model turn");
            }
            status => {
                return Err(ApplicationError::Precondition(format!(
                    "cannot take a turn from session status {status:?}"
                )));
            }
        }

        let messages = self
            .prompts
            .conversation(farmer, good, session.side, session, &self.catalog)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;

        // Fresh receiver per turn: a cancellation raised before this point
        // shows in borrow(), one raised mid-flight wakes the select.
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut reply = None;
        for attempt in 0..=self.max_retries {
            if *cancel_rx.borrow() {
                return Ok(withdraw_session(&self.machine, session)?);
            }
            let seed = self.seeds.next_seed();
            let call = tokio::time::timeout(self.model_deadline, self.client.complete(&messages, seed));
            tokio::pin!(call);

            let result = tokio::select! {
                result = &mut call => result.unwrap_or(Err(TransportError::Timeout)),
                _ = cancel_rx.changed() => {
                    // The in-flight completion future drops here; a late
                    // reply can never reach the session.
                    return Ok(withdraw_session(&self.machine, session)?);
                }
            };

            match result {
                Ok(text) => {
                    reply = Some(text);
                    break;
                }
                Err(error) => {
                    warn!(session = %session.id.0, attempt, %error, "model query failed");
                }
            }
        }

        let Some(text) = reply else {
            debug!(session = %session.id.0, "transport budget exhausted, session stays pending");
            return Ok(TurnOutcome::Distracted);
        };

        let intent = parse_reply(&text);
        session.record(Speaker::Farmer, &text, Some(intent.clone()));

        let legality = LegalityContext::snapshot(player, farmer, &session.good);
        let outcome = self
            .machine
            .apply(session, SessionEvent::ModelReplied(intent.clone()), &legality)
            .map_err(DomainError::from)
            .map_err(ApplicationError::from)?;

        if outcome.actions.contains(&SessionAction::SettleDeal) {
            return match settle(session, player, farmer) {
                Ok(settlement) => {
                    info!(
                        session = %session.id.0,
                        good = %settlement.good,
                        quantity = settlement.quantity,
                        total = %settlement.total,
                        "deal settled"
                    );
                    Ok(TurnOutcome::Settled { text, settlement })
                }
                Err(error) => {
                    warn!(session = %session.id.0, %error, "committed deal failed to settle");
                    session.status = SessionStatus::Aborted;
                    session.abort_reason = Some(AbortReason::SettlementFailed);
                    Ok(TurnOutcome::SessionAborted {
                        reason: AbortReason::SettlementFailed,
                        text: Some(text),
                    })
                }
            };
        }

        if outcome.to == SessionStatus::Aborted {
            let reason = session.abort_reason.unwrap_or(AbortReason::FarmerRefused);
            return Ok(TurnOutcome::SessionAborted { reason, text: Some(text) });
        }

        Ok(TurnOutcome::FarmerReplied { text, intent })
    }

    /// Withdraw from the current session between turns.
    pub fn withdraw(&mut self) -> Result<(), ApplicationError> {
        let session = self.session.as_mut().ok_or_else(|| {
            ApplicationError::Precondition("no negotiation session is open".to_string())
        })?;
        self.cancel_tx.send_replace(true);
        withdraw_session(&self.machine, session)?;
        Ok(())
    }

    /// Hand back the session once it has reached a terminal status.
    pub fn take_finished(&mut self) -> Option<NegotiationSession> {
        if self.session.as_ref().is_some_and(|session| session.status.is_terminal()) {
            self.session.take()
        } else {
            None
        }
    }
}

fn withdraw_session(
    machine: &NegotiationMachine,
    session: &mut NegotiationSession,
) -> Result<TurnOutcome, ApplicationError> {
    // Withdrawal never consults ledgers.
    let legality = LegalityContext {
        farmer_stock: 0,
        farmer_funds: Decimal::ZERO,
        player_stock: 0,
        player_funds: Decimal::ZERO,
    };
    machine
        .apply(session, SessionEvent::PlayerWithdrew, &legality)
        .map_err(DomainError::from)
        .map_err(ApplicationError::from)?;
    info!(session = %session.id.0, "session cancelled by the player");
    Ok(TurnOutcome::Withdrawn)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use haggle_core::domain::farmer::{Disposition, Farmer, FarmerId, Temperament};
    use haggle_core::domain::good::{default_catalog, find_good, Good, GoodId};
    use haggle_core::domain::inventory::Inventory;
    use haggle_core::domain::player::Player;
    use haggle_core::negotiation::machine::NegotiationPolicy;
    use haggle_core::negotiation::session::{AbortReason, SessionStatus, TradeSide};
    use haggle_core::world::map::LocationId;

    use crate::llm::{ChatMessage, CompletionClient, TransportError};

    use super::{Negotiator, TurnOutcome};

    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, TransportError>>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String, TransportError>>) -> Self {
            Self { replies: Mutex::new(replies.into_iter().collect()) }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _seed: u64,
        ) -> Result<String, TransportError> {
            self.replies
                .lock()
                .expect("reply script lock")
                .pop_front()
                .unwrap_or(Err(TransportError::EmptyReply))
        }
    }

    struct NeverReplies;

    #[async_trait]
    impl CompletionClient for NeverReplies {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _seed: u64,
        ) -> Result<String, TransportError> {
            std::future::pending().await
        }
    }

    fn farmer() -> Farmer {
        let mut inventory = Inventory::new();
        inventory.credit(&GoodId::new("apples"), 10);
        Farmer {
            id: FarmerId::new("f-1"),
            name: "Orrin Hale".to_string(),
            location: LocationId::new("loc-1"),
            disposition: Disposition {
                temperament: Temperament::Gruff,
                spread: Decimal::new(10, 2),
                patience: 3,
            },
            inventory,
            funds: Decimal::ZERO,
        }
    }

    fn apples() -> Good {
        find_good(&default_catalog(), &GoodId::new("apples")).expect("apples in catalog").clone()
    }

    fn negotiator<C: CompletionClient>(client: C) -> Negotiator<C> {
        Negotiator::new(client, default_catalog(), NegotiationPolicy::default(), 2, 5)
            .expect("negotiator builds")
    }

    #[tokio::test]
    async fn accepted_deal_settles_goods_and_funds() {
        let client = ScriptedClient::new(vec![
            Ok("Eight a crate, not a cent less.\nDECISION: OFFER 5 @ 8".to_string()),
            Ok("Done.\nDECISION: ACCEPT".to_string()),
        ]);
        let mut negotiator = negotiator(client);
        let mut farmer = farmer();
        let mut player = Player::new(LocationId::new("loc-1"), Decimal::from(100));
        let good = apples();

        negotiator.open(&farmer, &good, TradeSide::PlayerBuys, &player).expect("open");
        let first = negotiator
            .submit("Five crates of apples?", &mut player, &mut farmer, &good)
            .await
            .expect("first turn");
        assert!(matches!(first, TurnOutcome::FarmerReplied { .. }));

        let second = negotiator
            .submit("Fine, eight it is.", &mut player, &mut farmer, &good)
            .await
            .expect("second turn");

        let TurnOutcome::Settled { settlement, .. } = second else {
            panic!("expected a settled deal, got {second:?}");
        };
        assert_eq!(settlement.total, Decimal::from(40));
        assert_eq!(player.funds, Decimal::from(60));
        assert_eq!(player.inventory.quantity_of(&good.id), 5);
        assert_eq!(farmer.inventory.quantity_of(&good.id), 5);
        assert_eq!(farmer.funds, Decimal::from(40));

        let finished = negotiator.take_finished().expect("session is terminal");
        assert_eq!(finished.status, SessionStatus::Committed);
        assert!(finished.settled);
    }

    #[tokio::test]
    async fn player_offer_accepted_outright_settles() {
        // The farmer accepts the player's opening terms without countering.
        let client =
            ScriptedClient::new(vec![Ok("Fine, five at eight.\nDECISION: ACCEPT".to_string())]);
        let mut negotiator = negotiator(client);
        let mut farmer = farmer();
        let mut player = Player::new(LocationId::new("loc-1"), Decimal::from(100));
        let good = apples();

        negotiator.open(&farmer, &good, TradeSide::PlayerBuys, &player).expect("open");
        let outcome = negotiator
            .submit("I'll take 5 crates of apples at 8 each.", &mut player, &mut farmer, &good)
            .await
            .expect("turn runs");

        let TurnOutcome::Settled { settlement, .. } = outcome else {
            panic!("expected the player's own offer to settle, got {outcome:?}");
        };
        assert_eq!(settlement.unit_price, 8);
        assert_eq!(settlement.quantity, 5);
        assert_eq!(player.funds, Decimal::from(60));
        assert_eq!(player.inventory.quantity_of(&good.id), 5);
        assert_eq!(farmer.inventory.quantity_of(&good.id), 5);
    }

    #[tokio::test]
    async fn refusal_aborts_the_session() {
        let client =
            ScriptedClient::new(vec![Ok("Get off my land.\nDECISION: WALK".to_string())]);
        let mut negotiator = negotiator(client);
        let mut farmer = farmer();
        let mut player = Player::new(LocationId::new("loc-1"), Decimal::from(100));
        let good = apples();

        negotiator.open(&farmer, &good, TradeSide::PlayerBuys, &player).expect("open");
        let outcome = negotiator
            .submit("Give them to me for free.", &mut player, &mut farmer, &good)
            .await
            .expect("turn runs");

        assert!(matches!(
            outcome,
            TurnOutcome::SessionAborted { reason: AbortReason::FarmerRefused, .. }
        ));
        assert_eq!(
            negotiator.take_finished().expect("terminal session").status,
            SessionStatus::Aborted
        );
    }

    #[tokio::test]
    async fn consecutive_gibberish_exhausts_the_unparseable_budget() {
        let client = ScriptedClient::new(vec![
            Ok("the fen wind howls".to_string()),
            Ok("barley moon barley moon".to_string()),
        ]);
        let mut negotiator = negotiator(client);
        let mut farmer = farmer();
        let mut player = Player::new(LocationId::new("loc-1"), Decimal::from(100));
        let good = apples();

        negotiator.open(&farmer, &good, TradeSide::PlayerBuys, &player).expect("open");
        let first = negotiator
            .submit("Two crates?", &mut player, &mut farmer, &good)
            .await
            .expect("first turn");
        assert!(matches!(first, TurnOutcome::FarmerReplied { .. }), "one miss is survivable");

        let second = negotiator
            .submit("Hello? Two crates?", &mut player, &mut farmer, &good)
            .await
            .expect("second turn");

        assert!(matches!(
            second,
            TurnOutcome::SessionAborted { reason: AbortReason::Unparseable, .. }
        ));
    }

    #[tokio::test]
    async fn one_timeout_recovers_within_the_retry_budget() {
        let client = ScriptedClient::new(vec![
            Err(TransportError::Timeout),
            Ok("Seven a crate.\nDECISION: OFFER 5 @ 7".to_string()),
        ]);
        let mut negotiator = negotiator(client);
        let mut farmer = farmer();
        let mut player = Player::new(LocationId::new("loc-1"), Decimal::from(100));
        let good = apples();

        negotiator.open(&farmer, &good, TradeSide::PlayerBuys, &player).expect("open");
        let outcome = negotiator
            .submit("Five crates?", &mut player, &mut farmer, &good)
            .await
            .expect("turn survives one timeout");

        assert!(matches!(outcome, TurnOutcome::FarmerReplied { .. }));
        let session = negotiator.session().expect("session is live");
        assert_eq!(session.status, SessionStatus::PlayerTurn);
        assert_eq!(session.current_terms(), Some((7, 5)));
        // Only the player line and the reply that actually arrived.
        assert_eq!(session.transcript.len(), 2);
    }

    #[tokio::test]
    async fn transport_failures_leave_the_session_resumable() {
        let client = ScriptedClient::new(vec![
            Err(TransportError::Http("connection refused".to_string())),
            Err(TransportError::Http("connection refused".to_string())),
            Err(TransportError::Timeout),
            Ok("Six a crate.\nDECISION: OFFER 2 @ 6".to_string()),
        ]);
        let mut negotiator = negotiator(client);
        let mut farmer = farmer();
        let mut player = Player::new(LocationId::new("loc-1"), Decimal::from(100));
        let good = apples();

        negotiator.open(&farmer, &good, TradeSide::PlayerBuys, &player).expect("open");
        let outcome = negotiator
            .submit("Two crates?", &mut player, &mut farmer, &good)
            .await
            .expect("turn runs");
        assert_eq!(outcome, TurnOutcome::Distracted);
        assert_eq!(
            negotiator.session().expect("session survives").status,
            SessionStatus::AwaitingModel
        );

        // The pending model turn resumes without burning a player turn.
        let resumed = negotiator
            .submit("", &mut player, &mut farmer, &good)
            .await
            .expect("resume runs");
        assert!(matches!(resumed, TurnOutcome::FarmerReplied { .. }));
        assert_eq!(negotiator.session().expect("session").turn, 1);
    }

    #[tokio::test]
    async fn cancellation_discards_the_inflight_reply() {
        let mut negotiator = negotiator(NeverReplies);
        let mut farmer = farmer();
        let mut player = Player::new(LocationId::new("loc-1"), Decimal::from(100));
        let good = apples();

        negotiator.open(&farmer, &good, TradeSide::PlayerBuys, &player).expect("open");
        let handle = negotiator.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.cancel();
        });

        let outcome = negotiator
            .submit("Two crates?", &mut player, &mut farmer, &good)
            .await
            .expect("turn resolves on cancel");

        assert_eq!(outcome, TurnOutcome::Withdrawn);
        let finished = negotiator.take_finished().expect("terminal session");
        assert_eq!(finished.status, SessionStatus::Cancelled);
        assert_eq!(player.funds, Decimal::from(100), "cancellation never touches ledgers");
    }

    #[tokio::test]
    async fn a_second_open_while_live_is_refused() {
        let mut negotiator = negotiator(ScriptedClient::new(Vec::new()));
        let farmer = farmer();
        let player = Player::new(LocationId::new("loc-1"), Decimal::from(100));
        let good = apples();

        negotiator.open(&farmer, &good, TradeSide::PlayerBuys, &player).expect("first open");
        let error = negotiator
            .open(&farmer, &good, TradeSide::PlayerBuys, &player)
            .expect_err("second open must fail");

        assert!(matches!(error, haggle_core::errors::ApplicationError::Precondition(_)));
    }

    #[tokio::test]
    async fn withdraw_between_turns_cancels_the_session() {
        let mut negotiator = negotiator(ScriptedClient::new(Vec::new()));
        let farmer = farmer();
        let player = Player::new(LocationId::new("loc-1"), Decimal::from(100));
        let good = apples();

        negotiator.open(&farmer, &good, TradeSide::PlayerBuys, &player).expect("open");
        negotiator.withdraw().expect("withdraw");

        assert_eq!(
            negotiator.take_finished().expect("terminal session").status,
            SessionStatus::Cancelled
        );
    }
}
