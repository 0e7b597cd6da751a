//! Common types used throughout the surfsol ledger backend.
//!
//! Everything here is plain data plus the pure incentive policy (bonus sizing, referral
//! commission, withdrawal classification). Persistence and orchestration live in
//! `surfsol-ledger`.

pub mod casino;

pub use casino::*;

/// Platform (messaging bot) user identifier.
pub type UserId = i64;

/// Row identifier of a queued withdrawal.
pub type WithdrawalId = i64;

/// Milliseconds since the Unix epoch, read from the wall clock.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
