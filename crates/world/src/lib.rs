//! The World: binds the ID registry, ledger, artifact store, contract
//! engine, and action executor into the kernel's single process-level
//! global, and exposes the five action intents as one dispatcher.

pub mod action;
pub mod capability;
pub mod collaborators;
pub mod config;
pub mod invocation_registry;
pub mod mint;
pub mod quota;
pub mod world;

pub use action::{parse_intent_from_json, ActionIntent, ActionResult};
pub use capability::{CapabilityConfig, CapabilityResponse, ExternalCapabilityManager};
pub use collaborators::{LlmMessage, LlmResponse, NullLlmProvider, StaticLlmProvider};
pub use config::WorldConfig;
pub use invocation_registry::{InvocationRecord, InvocationRegistry};
pub use mint::{MintAuctionResult, MintSubmission};
pub use quota::QuotaTracker;
pub use world::World;
