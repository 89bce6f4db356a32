//! The ledger component of the agent-economy kernel.

mod delegation;
mod ledger;
mod rate_tracker;

pub use delegation::{DelegationGrant, DelegationRegistry};
pub use ledger::{BalanceInfo, Ledger};
pub use rate_tracker::RateTracker;
