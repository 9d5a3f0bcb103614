//! Domain layer for the haggling game: goods, farmers, the world map,
//! negotiation sessions, and the deal settlement rules. Everything here is
//! deterministic and free of I/O; the agent and CLI crates drive it.

pub mod config;
pub mod domain;
pub mod errors;
pub mod negotiation;
pub mod world;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::farmer::{Disposition, Farmer, FarmerId, Temperament};
pub use domain::good::{default_catalog, find_good, Good, GoodId};
pub use domain::inventory::{Inventory, InventoryError};
pub use domain::player::Player;
pub use errors::{ApplicationError, DomainError};
pub use negotiation::machine::{
    LegalityContext, NegotiationMachine, NegotiationPolicy, SessionAction, SessionEvent,
    SessionTransitionError, TransitionOutcome,
};
pub use negotiation::session::{
    AbortReason, NegotiationSession, ParsedIntent, SessionId, SessionStatus, Speaker,
    TradeSide, TranscriptEntry,
};
pub use negotiation::settle::{settle, CommitError, Settlement};
pub use world::generate::{generate_world, GenerationParams};
pub use world::map::{Location, LocationId, World, WorldError};
