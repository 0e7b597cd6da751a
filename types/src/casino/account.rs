use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use super::{Amount, GrantOutcome, ReferralOutcome, DEFAULT_LOCALE, SUPPORTED_LOCALES};
use crate::UserId;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum AccountInvariantError {
    #[error("unsupported locale: {0}")]
    UnsupportedLocale(String),
}

/// Checks a locale tag against the menus the bot ships.
pub fn validate_locale(locale: &str) -> Result<(), AccountInvariantError> {
    if SUPPORTED_LOCALES.contains(&locale) {
        Ok(())
    } else {
        Err(AccountInvariantError::UnsupportedLocale(locale.to_string()))
    }
}

/// A platform user and their custodial wallet.
///
/// `address` and `encrypted_secret` are attached together once a wallet is provisioned.
/// The secret never leaves the ledger in serialized form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub address: Option<String>,
    #[serde(skip)]
    pub encrypted_secret: Option<String>,
    pub locale: Option<String>,
    pub verified: bool,
    pub created_at_ms: u64,
}

impl User {
    pub fn has_wallet(&self) -> bool {
        self.address.is_some() && self.encrypted_secret.is_some()
    }

    pub fn locale_or_default(&self) -> &str {
        self.locale.as_deref().unwrap_or(DEFAULT_LOCALE)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: i64,
    pub user_id: UserId,
    pub amount: Amount,
    pub created_at_ms: u64,
}

/// Wallet state reported after provisioning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletProvision {
    pub address: String,
    /// True when this call generated the keypair.
    pub created: bool,
}

/// Everything a deposit event produced.
///
/// `bonus` is absent when the deposit was below the bonus minimum, `referral` when no code
/// accompanied it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub deposit: Deposit,
    pub bonus: Option<GrantOutcome>,
    pub referral: Option<ReferralOutcome>,
}
