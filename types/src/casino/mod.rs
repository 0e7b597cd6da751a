//! Casino ledger domain types.
//!
//! Defines the account/deposit/bonus/referral/withdrawal records and the incentive constants
//! used by the ledger engines and the HTTP surface.

mod account;
mod amount;
mod bonus;
mod constants;
mod referral;
mod withdrawal;

pub use account::*;
pub use amount::*;
pub use bonus::*;
pub use constants::*;
pub use referral::*;
pub use withdrawal::*;

#[cfg(test)]
mod tests;
