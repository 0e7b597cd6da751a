use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use surfsol_types::{
    classify_withdrawal, now_ms, Amount, PendingWithdrawal, UserId, WithdrawalClass,
    WithdrawalDecision, WithdrawalId, WithdrawalStatus, WINNINGS_REASON,
};
use tracing::{info, warn};

use crate::deposits::initial_deposit;
use crate::store::{to_i64, to_u64, Store};
use crate::{Error, Result};

const WITHDRAWAL_COLUMNS: &str =
    "id, user_id, amount, address, reason, status, created_at_ms, processed_at_ms";

/// Withdrawal requests and their admin review queue.
#[derive(Clone)]
pub struct WithdrawalWorkflow {
    store: Arc<Store>,
}

impl WithdrawalWorkflow {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Decides how a withdrawal proceeds.
    ///
    /// Amounts up to the user's initial deposit are instant and leave no record; larger
    /// amounts are queued for review. Nothing is written when the balance is insufficient.
    pub fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: Amount,
        address: &str,
        current_balance: Amount,
    ) -> Result<WithdrawalDecision> {
        let decision = self.store.write(|tx| {
            let initial = initial_deposit(tx, user_id)?;
            match classify_withdrawal(amount, current_balance, initial)? {
                WithdrawalClass::Instant => Ok(WithdrawalDecision::Instant {
                    amount,
                    address: address.to_string(),
                }),
                WithdrawalClass::Review => {
                    let row = insert_pending(tx, user_id, amount, address, now_ms())?;
                    Ok(WithdrawalDecision::Pending(row))
                }
            }
        });
        match &decision {
            Ok(WithdrawalDecision::Instant { .. }) => {
                info!(user_id, amount = %amount, "withdrawal instant")
            }
            Ok(WithdrawalDecision::Pending(row)) => {
                info!(user_id, amount = %amount, withdrawal_id = row.id, "withdrawal queued")
            }
            Err(Error::InsufficientBalance(err)) => warn!(user_id, %err, "withdrawal refused"),
            Err(_) => {}
        }
        decision
    }

    pub fn admin_approve(&self, id: WithdrawalId) -> Result<Option<PendingWithdrawal>> {
        self.resolve(id, WithdrawalStatus::Approved)
    }

    pub fn admin_reject(&self, id: WithdrawalId) -> Result<Option<PendingWithdrawal>> {
        self.resolve(id, WithdrawalStatus::Rejected)
    }

    /// Sets the status and stamps the processing time, whatever the current status is.
    fn resolve(
        &self,
        id: WithdrawalId,
        status: WithdrawalStatus,
    ) -> Result<Option<PendingWithdrawal>> {
        let resolved = self.store.write(|tx| {
            let Some(previous) = load_withdrawal(tx, id)? else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE withdrawals SET status = ?1, processed_at_ms = ?2 WHERE id = ?3",
                params![
                    status.as_str(),
                    to_i64(now_ms(), "withdrawal processed_at_ms")?,
                    id
                ],
            )?;
            Ok(load_withdrawal(tx, id)?.map(|row| (previous.status, row)))
        })?;
        match &resolved {
            Some((previous, row)) if previous.is_resolved() => warn!(
                withdrawal_id = id,
                user_id = row.user_id,
                %previous,
                %status,
                "resolved withdrawal overwritten"
            ),
            Some((_, row)) => {
                info!(withdrawal_id = id, user_id = row.user_id, %status, "withdrawal resolved")
            }
            None => warn!(withdrawal_id = id, %status, "withdrawal not found"),
        }
        Ok(resolved.map(|(_, row)| row))
    }

    /// Pending requests, newest first.
    pub fn list_pending(&self) -> Result<Vec<PendingWithdrawal>> {
        self.store.read(|conn| {
            let sql = format!(
                "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE status = ?1
                 ORDER BY created_at_ms DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![WithdrawalStatus::Pending.as_str()], read_row)?;
            let mut pending = Vec::new();
            for row in rows {
                pending.push(into_withdrawal(row?)?);
            }
            Ok(pending)
        })
    }

    pub fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<PendingWithdrawal>> {
        self.store.read(|conn| load_withdrawal(conn, id))
    }
}

type WithdrawalRow = (
    WithdrawalId,
    UserId,
    i64,
    String,
    String,
    String,
    i64,
    Option<i64>,
);

fn read_row(row: &Row<'_>) -> rusqlite::Result<WithdrawalRow> {
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

fn into_withdrawal(row: WithdrawalRow) -> Result<PendingWithdrawal> {
    let (id, user_id, amount, address, reason, status, created_at_ms, processed_at_ms) = row;
    Ok(PendingWithdrawal {
        id,
        user_id,
        amount: Amount::from_units(amount),
        address,
        reason,
        status: status
            .parse()
            .map_err(|err: surfsol_types::UnknownStatus| Error::Corrupt(err.to_string()))?,
        created_at_ms: to_u64(created_at_ms, "withdrawal created_at_ms")?,
        processed_at_ms: processed_at_ms
            .map(|ms| to_u64(ms, "withdrawal processed_at_ms"))
            .transpose()?,
    })
}

fn load_withdrawal(conn: &Connection, id: WithdrawalId) -> Result<Option<PendingWithdrawal>> {
    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1");
    conn.query_row(&sql, params![id], read_row)
        .optional()?
        .map(into_withdrawal)
        .transpose()
}

fn insert_pending(
    conn: &Connection,
    user_id: UserId,
    amount: Amount,
    address: &str,
    created_at_ms: u64,
) -> Result<PendingWithdrawal> {
    conn.execute(
        "INSERT INTO withdrawals (user_id, amount, address, reason, status, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            amount.units(),
            address,
            WINNINGS_REASON,
            WithdrawalStatus::Pending.as_str(),
            to_i64(created_at_ms, "withdrawal created_at_ms")?
        ],
    )?;
    Ok(PendingWithdrawal {
        id: conn.last_insert_rowid(),
        user_id,
        amount,
        address: address.to_string(),
        reason: WINNINGS_REASON.to_string(),
        status: WithdrawalStatus::Pending,
        created_at_ms,
        processed_at_ms: None,
    })
}
