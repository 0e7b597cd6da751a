use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use surfsol_types::{now_ms, Amount, Bonus, GrantOutcome, RolloverOutcome, UserId};
use tracing::{info, warn};

use crate::store::{to_i64, Store};
use crate::{Error, Result};

/// First-deposit bonus issuance and rollover tracking.
///
/// Per user: `None -> Active -> Converted`. Conversion is terminal.
#[derive(Clone)]
pub struct BonusEngine {
    store: Arc<Store>,
}

impl BonusEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Issues the first-deposit bonus unless a live or converted one already exists.
    ///
    /// The caller decides whether the deposit qualifies.
    pub fn grant_first_deposit_bonus(
        &self,
        user_id: UserId,
        deposit: Amount,
    ) -> Result<GrantOutcome> {
        let outcome = self.store.write(|tx| {
            if let Some(existing) = load_bonus(tx, user_id)? {
                if existing.blocks_new_grant() {
                    return Ok(GrantOutcome::AlreadyActive(existing));
                }
            }
            let bonus = Bonus::for_first_deposit(deposit);
            store_bonus(tx, user_id, &bonus, now_ms())?;
            Ok(GrantOutcome::Granted(bonus))
        })?;
        match &outcome {
            GrantOutcome::Granted(bonus) => info!(
                user_id,
                bonus = %bonus.bonus_balance,
                required_rollover = %bonus.required_rollover,
                "bonus granted"
            ),
            GrantOutcome::AlreadyActive(_) => warn!(user_id, "bonus already active"),
        }
        Ok(outcome)
    }

    /// Current bonus state; all zero when the user never had one.
    pub fn get_bonus(&self, user_id: UserId) -> Result<Bonus> {
        self.store
            .read(|conn| Ok(load_bonus(conn, user_id)?.unwrap_or_default()))
    }

    /// Counts `wagered` toward the rollover and draws it from the bonus balance.
    ///
    /// The balance may go negative before the requirement is met. Meeting the requirement
    /// converts the bonus within the same transaction.
    pub fn apply_rollover(&self, user_id: UserId, wagered: Amount) -> Result<RolloverOutcome> {
        let outcome = self.store.write(|tx| {
            let Some(mut bonus) = load_bonus(tx, user_id)? else {
                return Ok(RolloverOutcome::NoBonus);
            };
            if bonus.is_converted {
                return Ok(RolloverOutcome::AlreadyConverted { bonus });
            }
            bonus.total_rolled = bonus
                .total_rolled
                .checked_add(wagered)
                .ok_or(Error::AmountOverflow("bonus total_rolled"))?;
            bonus.bonus_balance = bonus
                .bonus_balance
                .checked_sub(wagered)
                .ok_or(Error::AmountOverflow("bonus balance"))?;
            let converted = bonus.rollover_met();
            if converted {
                bonus.bonus_balance = Amount::ZERO;
                bonus.is_converted = true;
            }
            tx.execute(
                "UPDATE bonuses SET bonus_balance = ?1, total_rolled = ?2, converted = ?3
                 WHERE user_id = ?4 AND converted = 0",
                params![
                    bonus.bonus_balance.units(),
                    bonus.total_rolled.units(),
                    bonus.is_converted,
                    user_id
                ],
            )?;
            Ok(RolloverOutcome::Applied { bonus, converted })
        })?;
        match &outcome {
            RolloverOutcome::Applied {
                bonus,
                converted: true,
            } => info!(user_id, total_rolled = %bonus.total_rolled, "bonus converted"),
            RolloverOutcome::Applied { bonus, .. } => info!(
                user_id,
                wagered = %wagered,
                remaining = %bonus.remaining_rollover(),
                "rollover applied"
            ),
            RolloverOutcome::AlreadyConverted { .. } => {
                warn!(user_id, "rollover ignored: bonus already converted")
            }
            RolloverOutcome::NoBonus => warn!(user_id, "rollover ignored: no bonus"),
        }
        Ok(outcome)
    }
}

fn load_bonus(conn: &Connection, user_id: UserId) -> Result<Option<Bonus>> {
    let bonus = conn
        .query_row(
            "SELECT bonus_balance, total_rolled, required_rollover, converted
             FROM bonuses WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(Bonus {
                    bonus_balance: Amount::from_units(row.get(0)?),
                    total_rolled: Amount::from_units(row.get(1)?),
                    required_rollover: Amount::from_units(row.get(2)?),
                    is_converted: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(bonus)
}

fn store_bonus(
    conn: &Connection,
    user_id: UserId,
    bonus: &Bonus,
    created_at_ms: u64,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO bonuses
         (user_id, bonus_balance, total_rolled, required_rollover, converted, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            bonus.bonus_balance.units(),
            bonus.total_rolled.units(),
            bonus.required_rollover.units(),
            bonus.is_converted,
            to_i64(created_at_ms, "bonus created_at_ms")?
        ],
    )?;
    Ok(())
}
