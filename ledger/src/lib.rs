//! Ledger and incentive bookkeeping.
//!
//! Every component borrows the same [`Store`] handle and re-reads durable state on each call.
//! [`Ledger`] wires them together and runs the deposit pipeline.

use std::path::Path;
use std::sync::Arc;
use surfsol_types::{
    AccountInvariantError, Amount, DepositReceipt, InsufficientBalance, UserId, MIN_BONUS_DEPOSIT,
};
use thiserror::Error;
use tracing::info;

mod accounts;
mod bonus;
mod deposits;
mod referral;
mod store;
pub mod wallet;
mod withdrawal;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use accounts::AccountRegistry;
pub use bonus::BonusEngine;
pub use deposits::DepositRecorder;
pub use referral::{CodeGenerator, ReferralEngine};
pub use store::Store;
pub use wallet::{ChaChaCipher, SecretCipher};
pub use withdrawal::WithdrawalWorkflow;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("ledger store lock poisoned")]
    Poisoned,
    #[error(transparent)]
    InsufficientBalance(#[from] InsufficientBalance),
    #[error("user not found: {0}")]
    UserNotFound(UserId),
    #[error(transparent)]
    InvalidAccount(#[from] AccountInvariantError),
    #[error("referral code generation failed after {attempts} attempts")]
    CodeGeneration { attempts: usize },
    #[error("wallet error: {0}")]
    Wallet(String),
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
    #[error("amount overflow: {0}")]
    AmountOverflow(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The ledger components, all sharing one store.
#[derive(Clone)]
pub struct Ledger {
    accounts: AccountRegistry,
    deposits: DepositRecorder,
    bonuses: BonusEngine,
    referrals: ReferralEngine,
    withdrawals: WithdrawalWorkflow,
}

impl Ledger {
    pub fn new(store: Arc<Store>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            accounts: AccountRegistry::new(store.clone(), cipher),
            deposits: DepositRecorder::new(store.clone()),
            bonuses: BonusEngine::new(store.clone()),
            referrals: ReferralEngine::new(store.clone()),
            withdrawals: WithdrawalWorkflow::new(store),
        }
    }

    /// Opens the database at `path` and builds a ledger over it.
    pub fn open(path: &Path, cipher: Arc<dyn SecretCipher>) -> Result<Self> {
        Ok(Self::new(Arc::new(Store::open(path)?), cipher))
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    pub fn deposits(&self) -> &DepositRecorder {
        &self.deposits
    }

    pub fn bonuses(&self) -> &BonusEngine {
        &self.bonuses
    }

    pub fn referrals(&self) -> &ReferralEngine {
        &self.referrals
    }

    pub fn withdrawals(&self) -> &WithdrawalWorkflow {
        &self.withdrawals
    }

    /// Records a deposit, grants the first-deposit bonus when it qualifies, then pays the
    /// referrer behind `referral_code`.
    ///
    /// Each step commits on its own. A failure in a later step leaves the earlier ones in
    /// place.
    pub fn process_deposit(
        &self,
        user_id: UserId,
        amount: Amount,
        referral_code: Option<&str>,
    ) -> Result<DepositReceipt> {
        let deposit = self.deposits.record_deposit(user_id, amount)?;
        let bonus = if amount >= MIN_BONUS_DEPOSIT {
            Some(self.bonuses.grant_first_deposit_bonus(user_id, amount)?)
        } else {
            None
        };
        let referral = match referral_code {
            Some(code) => Some(self.referrals.process_deposit(code, amount)?),
            None => None,
        };
        info!(
            user_id,
            amount = %amount,
            bonus_granted = bonus.as_ref().is_some_and(|outcome| outcome.is_granted()),
            referral_applied = referral.as_ref().is_some_and(|outcome| outcome.is_applied()),
            "deposit processed"
        );
        Ok(DepositReceipt {
            deposit,
            bonus,
            referral,
        })
    }
}
