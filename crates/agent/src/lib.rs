//! Model-facing layer: prompt construction, the completion transport, reply
//! parsing, and the orchestrator that drives a negotiation session through
//! the core state machine.

pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod prompt;

pub use llm::{
    farmer_seed, ChatMessage, CompletionClient, HttpCompletionClient, Role, SeedSequence,
    TransportError,
};
pub use orchestrator::{CancelHandle, Negotiator, TurnOutcome};
pub use parser::{parse_player_offer, parse_reply};
pub use prompt::{quoted_price, PromptBuilder, PromptError};
