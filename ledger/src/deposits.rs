use rusqlite::{params, Connection, Row};
use std::sync::Arc;
use surfsol_types::{now_ms, Amount, Deposit, UserId};
use tracing::info;

use crate::store::{to_i64, to_u64, Store};
use crate::Result;

/// Append-only deposit history.
#[derive(Clone)]
pub struct DepositRecorder {
    store: Arc<Store>,
}

impl DepositRecorder {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Appends a deposit. Amounts are taken as given.
    pub fn record_deposit(&self, user_id: UserId, amount: Amount) -> Result<Deposit> {
        let deposit = self
            .store
            .write(|tx| insert_deposit(tx, user_id, amount, now_ms()))?;
        info!(user_id, amount = %amount, deposit_id = deposit.id, "deposit recorded");
        Ok(deposit)
    }

    /// The smallest deposit ever recorded for the user, or zero.
    pub fn get_initial_deposit(&self, user_id: UserId) -> Result<Amount> {
        self.store.read(|conn| initial_deposit(conn, user_id))
    }

    pub fn list_deposits(&self, user_id: UserId) -> Result<Vec<Deposit>> {
        self.store.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, amount, created_at_ms FROM deposits
                 WHERE user_id = ?1 ORDER BY created_at_ms ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![user_id], read_row)?;
            let mut deposits = Vec::new();
            for row in rows {
                deposits.push(into_deposit(row?)?);
            }
            Ok(deposits)
        })
    }
}

type DepositRow = (i64, UserId, i64, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<DepositRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_deposit((id, user_id, amount, created_at_ms): DepositRow) -> Result<Deposit> {
    Ok(Deposit {
        id,
        user_id,
        amount: Amount::from_units(amount),
        created_at_ms: to_u64(created_at_ms, "deposit created_at_ms")?,
    })
}

pub(crate) fn insert_deposit(
    conn: &Connection,
    user_id: UserId,
    amount: Amount,
    created_at_ms: u64,
) -> Result<Deposit> {
    conn.execute(
        "INSERT INTO deposits (user_id, amount, created_at_ms) VALUES (?1, ?2, ?3)",
        params![
            user_id,
            amount.units(),
            to_i64(created_at_ms, "deposit created_at_ms")?
        ],
    )?;
    Ok(Deposit {
        id: conn.last_insert_rowid(),
        user_id,
        amount,
        created_at_ms,
    })
}

pub(crate) fn initial_deposit(conn: &Connection, user_id: UserId) -> Result<Amount> {
    let min: Option<i64> = conn.query_row(
        "SELECT MIN(amount) FROM deposits WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(min.map(Amount::from_units).unwrap_or_default())
}
