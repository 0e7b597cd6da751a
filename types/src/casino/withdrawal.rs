use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

use super::Amount;
use crate::{UserId, WithdrawalId};

#[derive(Debug, ThisError, PartialEq, Eq)]
#[error("unknown withdrawal status: {0}")]
pub struct UnknownStatus(pub String);

#[derive(Debug, ThisError, PartialEq, Eq)]
#[error("insufficient balance: requested {requested}, available {available}")]
pub struct InsufficientBalance {
    pub requested: Amount,
    pub available: Amount,
}

/// Review state of a queued withdrawal. Leaves `Pending` only through an admin action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub amount: Amount,
    pub address: String,
    pub reason: String,
    pub status: WithdrawalStatus,
    pub created_at_ms: u64,
    pub processed_at_ms: Option<u64>,
}

/// Route a withdrawal takes before any state is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithdrawalClass {
    Instant,
    Review,
}

/// Classifies a withdrawal request.
///
/// Requests above the current balance are refused. Requests up to the user's initial deposit
/// (inclusive) go out instantly, anything larger is queued for review.
pub fn classify_withdrawal(
    amount: Amount,
    current_balance: Amount,
    initial_deposit: Amount,
) -> Result<WithdrawalClass, InsufficientBalance> {
    if amount > current_balance {
        return Err(InsufficientBalance {
            requested: amount,
            available: current_balance,
        });
    }
    if amount <= initial_deposit {
        Ok(WithdrawalClass::Instant)
    } else {
        Ok(WithdrawalClass::Review)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum WithdrawalDecision {
    /// Within the instant ceiling. No row is written and no transfer is made here.
    Instant { amount: Amount, address: String },
    Pending(PendingWithdrawal),
}

impl WithdrawalDecision {
    pub fn is_instant(&self) -> bool {
        matches!(self, Self::Instant { .. })
    }
}
