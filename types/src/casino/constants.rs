use super::Amount;

/// Deposits at or above this size qualify for the first-deposit bonus.
pub const MIN_BONUS_DEPOSIT: Amount = Amount::from_whole(5);

/// First-deposit bonus match rate (40%).
pub const BONUS_MATCH_NUMERATOR: i64 = 4;
pub const BONUS_MATCH_DENOMINATOR: i64 = 10;

/// Cap on the first-deposit bonus.
pub const MAX_FIRST_DEPOSIT_BONUS: Amount = Amount::from_whole(2);

/// Wagering required before a bonus converts, as a multiple of the bonus.
pub const BONUS_ROLLOVER_MULTIPLIER: i64 = 60;

/// Referral commission is paid per complete chunk of the referred deposit.
pub const REFERRAL_CHUNK: Amount = Amount::from_whole(50);

/// Per-chunk commission at tier 1.
pub const TIER_ONE_CHUNK_REWARD: Amount = Amount::from_whole(5);

/// Per-chunk commission at tier 2 (5.5).
pub const TIER_TWO_CHUNK_REWARD: Amount = Amount::from_units(5_500_000_000);

/// Referred-deposit count at which a referrer is paid at tier 2.
pub const TIER_TWO_REFERRAL_COUNT: u32 = 10;

/// Referral code shape.
pub const REFERRAL_CODE_LENGTH: usize = 8;
pub const REFERRAL_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Upper bound on fresh codes tried before code issuance gives up.
pub const MAX_CODE_ATTEMPTS: usize = 16;

/// Reason recorded on withdrawals queued for review.
pub const WINNINGS_REASON: &str = "winnings";

/// Locale assumed when a user never picked one.
pub const DEFAULT_LOCALE: &str = "en";

/// Locales the bot ships menus for.
pub const SUPPORTED_LOCALES: &[&str] = &["en", "es"];
