use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use super::{
    Amount, REFERRAL_CHUNK, REFERRAL_CODE_ALPHABET, REFERRAL_CODE_LENGTH, TIER_ONE_CHUNK_REWARD,
    TIER_TWO_CHUNK_REWARD, TIER_TWO_REFERRAL_COUNT,
};
use crate::UserId;

#[derive(Debug, ThisError, PartialEq, Eq)]
#[error("invalid referral tier: {0}")]
pub struct InvalidTier(pub u8);

/// Referral commission level. Serialized as its number (1 or 2).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReferralTier {
    #[default]
    One,
    Two,
}

impl ReferralTier {
    /// Tier earned by a referrer with `referral_count` referred deposits on record.
    pub fn for_count(referral_count: u32) -> Self {
        if referral_count >= TIER_TWO_REFERRAL_COUNT {
            Self::Two
        } else {
            Self::One
        }
    }

    pub fn chunk_reward(self) -> Amount {
        match self {
            Self::One => TIER_ONE_CHUNK_REWARD,
            Self::Two => TIER_TWO_CHUNK_REWARD,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl From<ReferralTier> for u8 {
    fn from(tier: ReferralTier) -> Self {
        tier.level()
    }
}

impl TryFrom<u8> for ReferralTier {
    type Error = InvalidTier;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(InvalidTier(other)),
        }
    }
}

/// Commission owed on a referred deposit: one reward per complete chunk.
pub fn referral_commission(deposit: Amount, tier: ReferralTier) -> Amount {
    tier.chunk_reward().times(deposit.whole_multiples_of(REFERRAL_CHUNK))
}

/// Draws a fresh code from the uppercase alphanumeric alphabet.
pub fn generate_referral_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..REFERRAL_CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..REFERRAL_CODE_ALPHABET.len());
            REFERRAL_CODE_ALPHABET[idx] as char
        })
        .collect()
}

pub fn is_valid_referral_code(code: &str) -> bool {
    code.len() == REFERRAL_CODE_LENGTH
        && code.bytes().all(|b| REFERRAL_CODE_ALPHABET.contains(&b))
}

/// A user's referral account, created the first time they ask for a code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub user_id: UserId,
    pub referral_code: String,
    pub referred_by: Option<UserId>,
    pub total_deposits: Amount,
    pub referral_earnings: Amount,
    pub referral_count: u32,
    pub tier_level: ReferralTier,
    pub created_at_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IgnoredReason {
    UnknownCode,
    /// Deposit smaller than one chunk; nothing owed, stats untouched.
    BelowChunk {
        referrer_id: UserId,
        tier: ReferralTier,
    },
}

/// Result of routing a deposit through a referral code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReferralOutcome {
    Applied {
        referrer_id: UserId,
        earnings: Amount,
        tier: ReferralTier,
    },
    Ignored {
        #[serde(flatten)]
        reason: IgnoredReason,
    },
}

impl ReferralOutcome {
    pub fn earnings(&self) -> Amount {
        match self {
            Self::Applied { earnings, .. } => *earnings,
            Self::Ignored { .. } => Amount::ZERO,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Result of linking a user to the referrer whose code they arrived with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Attribution {
    Attributed { referrer_id: UserId },
    /// The first attribution wins; later codes are not recorded.
    AlreadyAttributed { referrer_id: UserId },
    SelfReferral,
    UnknownCode,
}
