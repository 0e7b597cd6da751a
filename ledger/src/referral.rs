use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use surfsol_types::{
    generate_referral_code, now_ms, referral_commission, Amount, Attribution, IgnoredReason,
    Referral, ReferralOutcome, ReferralTier, UserId, MAX_CODE_ATTEMPTS,
};
use tracing::{info, warn};

use crate::store::{to_i64, to_u64, Store};
use crate::{Error, Result};

/// Source of candidate referral codes.
pub type CodeGenerator = Arc<dyn Fn() -> String + Send + Sync>;

const REFERRAL_COLUMNS: &str = "user_id, referral_code, referred_by, total_deposits, \
     referral_earnings, referral_count, tier_level, created_at_ms";

/// Referral codes, attribution, and tiered commission.
#[derive(Clone)]
pub struct ReferralEngine {
    store: Arc<Store>,
    codes: CodeGenerator,
}

impl ReferralEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_code_generator(
            store,
            Arc::new(|| generate_referral_code(&mut rand::thread_rng())),
        )
    }

    pub fn with_code_generator(store: Arc<Store>, codes: CodeGenerator) -> Self {
        Self { store, codes }
    }

    /// Returns the user's code, creating their referral account on first use.
    pub fn issue_code(&self, user_id: UserId) -> Result<String> {
        let referral = self
            .store
            .write(|tx| match load_referral(tx, user_id)? {
                Some(existing) => Ok(existing),
                None => self.create_referral(tx, user_id),
            })?;
        Ok(referral.referral_code)
    }

    pub fn get_referral_info(&self, user_id: UserId) -> Result<Option<Referral>> {
        self.store.read(|conn| load_referral(conn, user_id))
    }

    /// Pays the owner of `referral_code` for a referred deposit.
    ///
    /// The tier is taken from the referrer's count before this deposit. Stats move only when
    /// the deposit covers at least one chunk.
    pub fn process_deposit(&self, referral_code: &str, deposit: Amount) -> Result<ReferralOutcome> {
        let outcome = self.store.write(|tx| {
            let Some(mut referrer) = find_by_code(tx, referral_code)? else {
                return Ok(ReferralOutcome::Ignored {
                    reason: IgnoredReason::UnknownCode,
                });
            };
            let tier = ReferralTier::for_count(referrer.referral_count);
            let earnings = referral_commission(deposit, tier);
            if !earnings.is_positive() {
                return Ok(ReferralOutcome::Ignored {
                    reason: IgnoredReason::BelowChunk {
                        referrer_id: referrer.user_id,
                        tier,
                    },
                });
            }
            referrer.total_deposits = referrer
                .total_deposits
                .checked_add(deposit)
                .ok_or(Error::AmountOverflow("referral total_deposits"))?;
            referrer.referral_earnings = referrer
                .referral_earnings
                .checked_add(earnings)
                .ok_or(Error::AmountOverflow("referral earnings"))?;
            referrer.referral_count += 1;
            referrer.tier_level = tier;
            tx.execute(
                "UPDATE referrals SET total_deposits = ?1, referral_earnings = ?2,
                 referral_count = ?3, tier_level = ?4 WHERE user_id = ?5",
                params![
                    referrer.total_deposits.units(),
                    referrer.referral_earnings.units(),
                    referrer.referral_count,
                    tier.level(),
                    referrer.user_id
                ],
            )?;
            Ok(ReferralOutcome::Applied {
                referrer_id: referrer.user_id,
                earnings,
                tier,
            })
        })?;
        match &outcome {
            ReferralOutcome::Applied {
                referrer_id,
                earnings,
                tier,
            } => info!(
                referrer_id,
                earnings = %earnings,
                tier = tier.level(),
                deposit = %deposit,
                "referral applied"
            ),
            ReferralOutcome::Ignored { reason } => {
                warn!(?reason, deposit = %deposit, "referral ignored")
            }
        }
        Ok(outcome)
    }

    /// Links `user_id` to the owner of `referral_code`. The first link wins.
    pub fn attribute(&self, user_id: UserId, referral_code: &str) -> Result<Attribution> {
        let attribution = self.store.write(|tx| {
            let Some(referrer) = find_by_code(tx, referral_code)? else {
                return Ok(Attribution::UnknownCode);
            };
            if referrer.user_id == user_id {
                return Ok(Attribution::SelfReferral);
            }
            let own = match load_referral(tx, user_id)? {
                Some(own) => own,
                None => self.create_referral(tx, user_id)?,
            };
            if let Some(referrer_id) = own.referred_by {
                return Ok(Attribution::AlreadyAttributed { referrer_id });
            }
            tx.execute(
                "UPDATE referrals SET referred_by = ?1 WHERE user_id = ?2",
                params![referrer.user_id, user_id],
            )?;
            Ok(Attribution::Attributed {
                referrer_id: referrer.user_id,
            })
        })?;
        info!(user_id, ?attribution, "referral attribution");
        Ok(attribution)
    }

    fn create_referral(&self, conn: &Connection, user_id: UserId) -> Result<Referral> {
        let created_at_ms = now_ms();
        let created_at = to_i64(created_at_ms, "referral created_at_ms")?;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = (self.codes)();
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO referrals (user_id, referral_code, created_at_ms)
                 VALUES (?1, ?2, ?3)",
                params![user_id, code, created_at],
            )?;
            if inserted == 1 {
                info!(user_id, code = %code, "referral code issued");
                return Ok(Referral {
                    user_id,
                    referral_code: code,
                    referred_by: None,
                    total_deposits: Amount::ZERO,
                    referral_earnings: Amount::ZERO,
                    referral_count: 0,
                    tier_level: ReferralTier::One,
                    created_at_ms,
                });
            }
        }
        warn!(user_id, attempts = MAX_CODE_ATTEMPTS, "referral code space exhausted");
        Err(Error::CodeGeneration {
            attempts: MAX_CODE_ATTEMPTS,
        })
    }
}

type ReferralRow = (UserId, String, Option<UserId>, i64, i64, u32, u8, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<ReferralRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn into_referral(row: ReferralRow) -> Result<Referral> {
    let (user_id, referral_code, referred_by, total, earnings, count, tier, created_at_ms) = row;
    Ok(Referral {
        user_id,
        referral_code,
        referred_by,
        total_deposits: Amount::from_units(total),
        referral_earnings: Amount::from_units(earnings),
        referral_count: count,
        tier_level: ReferralTier::try_from(tier).map_err(|err| Error::Corrupt(err.to_string()))?,
        created_at_ms: to_u64(created_at_ms, "referral created_at_ms")?,
    })
}

fn load_referral(conn: &Connection, user_id: UserId) -> Result<Option<Referral>> {
    let sql = format!("SELECT {REFERRAL_COLUMNS} FROM referrals WHERE user_id = ?1");
    conn.query_row(&sql, params![user_id], read_row)
        .optional()?
        .map(into_referral)
        .transpose()
}

fn find_by_code(conn: &Connection, code: &str) -> Result<Option<Referral>> {
    let sql = format!("SELECT {REFERRAL_COLUMNS} FROM referrals WHERE referral_code = ?1");
    conn.query_row(&sql, params![code], read_row)
        .optional()?
        .map(into_referral)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> ReferralEngine {
        ReferralEngine::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    fn set_count(engine: &ReferralEngine, user_id: UserId, count: u32) {
        engine
            .store
            .write(|tx| {
                tx.execute(
                    "UPDATE referrals SET referral_count = ?1 WHERE user_id = ?2",
                    params![count, user_id],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_issue_code_is_stable() {
        let engine = engine();
        let code = engine.issue_code(1).unwrap();
        assert!(surfsol_types::is_valid_referral_code(&code));
        assert_eq!(engine.issue_code(1).unwrap(), code);
        assert_ne!(engine.issue_code(2).unwrap(), code);

        let info = engine.get_referral_info(1).unwrap().unwrap();
        assert_eq!(info.referral_code, code);
        assert_eq!(info.referral_count, 0);
        assert_eq!(info.tier_level, ReferralTier::One);
        assert!(engine.get_referral_info(3).unwrap().is_none());
    }

    #[test]
    fn test_code_collision_retries_then_fails() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let engine = ReferralEngine::with_code_generator(
            store,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                "SAMECODE".to_string()
            }),
        );
        assert_eq!(engine.issue_code(1).unwrap(), "SAMECODE");
        calls.store(0, Ordering::SeqCst);

        let err = engine.issue_code(2).unwrap_err();
        assert!(matches!(
            err,
            Error::CodeGeneration {
                attempts: MAX_CODE_ATTEMPTS
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_CODE_ATTEMPTS);
        assert!(engine.get_referral_info(2).unwrap().is_none());
    }

    #[test]
    fn test_collision_recovers_on_next_candidate() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let engine = ReferralEngine::with_code_generator(
            store,
            Arc::new(move || match counter.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => "AAAAAAAA".to_string(),
                _ => "BBBBBBBB".to_string(),
            }),
        );
        assert_eq!(engine.issue_code(1).unwrap(), "AAAAAAAA");
        assert_eq!(engine.issue_code(2).unwrap(), "BBBBBBBB");
    }

    #[test]
    fn test_tier_one_commission() {
        let engine = engine();
        let code = engine.issue_code(1).unwrap();
        set_count(&engine, 1, 3);

        let outcome = engine.process_deposit(&code, Amount::from_whole(120)).unwrap();
        assert_eq!(
            outcome,
            ReferralOutcome::Applied {
                referrer_id: 1,
                earnings: Amount::from_whole(10),
                tier: ReferralTier::One,
            }
        );
        let info = engine.get_referral_info(1).unwrap().unwrap();
        assert_eq!(info.referral_count, 4);
        assert_eq!(info.total_deposits, Amount::from_whole(120));
        assert_eq!(info.referral_earnings, Amount::from_whole(10));
    }

    #[test]
    fn test_tier_two_commission() {
        let engine = engine();
        let code = engine.issue_code(1).unwrap();
        set_count(&engine, 1, 10);

        let outcome = engine.process_deposit(&code, Amount::from_whole(200)).unwrap();
        assert_eq!(outcome.earnings(), Amount::from_whole(22));
        let info = engine.get_referral_info(1).unwrap().unwrap();
        assert_eq!(info.tier_level, ReferralTier::Two);
        assert_eq!(info.referral_count, 11);
    }

    #[test]
    fn test_sub_chunk_deposit_leaves_stats_untouched() {
        let engine = engine();
        let code = engine.issue_code(1).unwrap();
        let before = engine.get_referral_info(1).unwrap();

        let outcome = engine.process_deposit(&code, Amount::from_whole(40)).unwrap();
        assert_eq!(
            outcome,
            ReferralOutcome::Ignored {
                reason: IgnoredReason::BelowChunk {
                    referrer_id: 1,
                    tier: ReferralTier::One,
                }
            }
        );
        assert_eq!(engine.get_referral_info(1).unwrap(), before);
    }

    #[test]
    fn test_unknown_code_is_ignored() {
        let outcome = engine()
            .process_deposit("ZZZZZZZZ", Amount::from_whole(500))
            .unwrap();
        assert_eq!(
            outcome,
            ReferralOutcome::Ignored {
                reason: IgnoredReason::UnknownCode
            }
        );
    }

    #[test]
    fn test_total_deposit_overflow_rolls_back() {
        let engine = engine();
        let code = engine.issue_code(1).unwrap();
        let huge = Amount::from_whole(5_000_000_000);
        engine.process_deposit(&code, huge).unwrap();
        let before = engine.get_referral_info(1).unwrap();

        let err = engine.process_deposit(&code, huge).unwrap_err();
        assert!(matches!(err, Error::AmountOverflow(_)));
        assert_eq!(engine.get_referral_info(1).unwrap(), before);

        let outcome = engine.process_deposit(&code, Amount::from_whole(50)).unwrap();
        assert!(outcome.earnings().is_positive());
    }

    #[test]
    fn test_tier_upgrades_after_ten_referrals() {
        let engine = engine();
        let code = engine.issue_code(1).unwrap();
        for _ in 0..10 {
            let outcome = engine.process_deposit(&code, Amount::from_whole(50)).unwrap();
            assert_eq!(outcome.earnings(), Amount::from_whole(5));
        }
        let outcome = engine.process_deposit(&code, Amount::from_whole(50)).unwrap();
        assert_eq!(outcome.earnings(), "5.5".parse().unwrap());
        let info = engine.get_referral_info(1).unwrap().unwrap();
        assert_eq!(info.referral_count, 11);
        assert_eq!(info.referral_earnings, "55.5".parse().unwrap());
    }

    #[test]
    fn test_attribution_first_link_wins() {
        let engine = engine();
        let first = engine.issue_code(1).unwrap();
        let second = engine.issue_code(2).unwrap();

        assert_eq!(
            engine.attribute(3, &first).unwrap(),
            Attribution::Attributed { referrer_id: 1 }
        );
        assert_eq!(
            engine.attribute(3, &second).unwrap(),
            Attribution::AlreadyAttributed { referrer_id: 1 }
        );
        assert_eq!(
            engine.get_referral_info(3).unwrap().unwrap().referred_by,
            Some(1)
        );
    }

    #[test]
    fn test_attribution_refusals() {
        let engine = engine();
        let code = engine.issue_code(1).unwrap();
        assert_eq!(engine.attribute(1, &code).unwrap(), Attribution::SelfReferral);
        assert_eq!(
            engine.attribute(2, "NOPE1234").unwrap(),
            Attribution::UnknownCode
        );
        assert!(engine.get_referral_info(2).unwrap().is_none());
    }
}
