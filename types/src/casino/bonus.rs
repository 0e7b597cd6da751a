use serde::{Deserialize, Serialize};

use super::{
    Amount, BONUS_MATCH_DENOMINATOR, BONUS_MATCH_NUMERATOR, BONUS_ROLLOVER_MULTIPLIER,
    MAX_FIRST_DEPOSIT_BONUS,
};

/// A user's first-deposit bonus and its rollover progress.
///
/// A user without a bonus row reads as the all-zero default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bonus {
    pub bonus_balance: Amount,
    pub total_rolled: Amount,
    pub required_rollover: Amount,
    pub is_converted: bool,
}

/// Lifecycle of a bonus: `None -> Active -> Converted`, no way back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusState {
    None,
    Active,
    Converted,
}

impl Bonus {
    /// Bonus issued for a qualifying first deposit: 40% of the deposit capped at 2, with 60x
    /// rollover.
    pub fn for_first_deposit(deposit: Amount) -> Self {
        let bonus_balance = deposit
            .mul_ratio(BONUS_MATCH_NUMERATOR, BONUS_MATCH_DENOMINATOR)
            .min(MAX_FIRST_DEPOSIT_BONUS);
        Self {
            bonus_balance,
            total_rolled: Amount::ZERO,
            required_rollover: bonus_balance.times(BONUS_ROLLOVER_MULTIPLIER),
            is_converted: false,
        }
    }

    /// Whether an existing row refuses a new grant.
    ///
    /// A positive balance means the bonus is live. A converted bonus is terminal. An
    /// unconverted row whose balance was wagered down to zero or below may be replaced.
    pub fn blocks_new_grant(&self) -> bool {
        self.bonus_balance.is_positive() || self.is_converted
    }

    pub fn rollover_met(&self) -> bool {
        self.total_rolled >= self.required_rollover
    }

    pub fn remaining_rollover(&self) -> Amount {
        self.required_rollover
            .checked_sub(self.total_rolled)
            .map_or(Amount::ZERO, |remaining| remaining.max(Amount::ZERO))
    }

    pub fn state(&self) -> BonusState {
        if self.is_converted {
            BonusState::Converted
        } else if *self == Self::default() {
            BonusState::None
        } else {
            BonusState::Active
        }
    }
}

/// Result of a first-deposit bonus grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "bonus", rename_all = "snake_case")]
pub enum GrantOutcome {
    Granted(Bonus),
    /// A live or converted bonus already exists; it is returned untouched.
    AlreadyActive(Bonus),
}

impl GrantOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    pub fn bonus(&self) -> &Bonus {
        match self {
            Self::Granted(bonus) | Self::AlreadyActive(bonus) => bonus,
        }
    }
}

/// Result of crediting wagering activity toward a bonus rollover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RolloverOutcome {
    /// Wager counted. `converted` is set when this call completed the rollover.
    Applied { bonus: Bonus, converted: bool },
    AlreadyConverted { bonus: Bonus },
    NoBonus,
}

impl RolloverOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn bonus(&self) -> Bonus {
        match self {
            Self::Applied { bonus, .. } | Self::AlreadyConverted { bonus } => *bonus,
            Self::NoBonus => Bonus::default(),
        }
    }
}
