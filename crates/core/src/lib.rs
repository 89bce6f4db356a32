//! Shared vocabulary for the agent-economy kernel: identifiers, the error
//! taxonomy, event types, and the handful of constants every other crate in
//! the workspace needs.

pub mod action;
pub mod constants;
pub mod error;
pub mod events;
pub mod ids;
pub mod json_bridge;
pub mod sandbox;

pub use action::PermissionAction;
pub use error::{ErrorCategory, ErrorCode, KernelError};
pub use events::{ChannelEventLogger, Event, EventLogger, EventType, NullEventLogger};
pub use ids::{IdCategory, IdRegistry};

/// Exact-decimal type used for every resource balance in the ledger.
/// Re-exported so downstream crates don't need a direct `rust_decimal`
/// dependency of their own version.
pub use rust_decimal::Decimal;
