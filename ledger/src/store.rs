//! SQLite-backed ledger store.
//!
//! The store owns one connection behind a mutex. Callers borrow it through [`Store::read`] or
//! [`Store::write`]; a write runs inside a transaction that commits when the closure returns
//! `Ok` and rolls back on every other exit path.

use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::{Error, Result};

const SCHEMA: &str = "
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        address TEXT,
        encrypted_secret TEXT,
        locale TEXT,
        verified INTEGER NOT NULL DEFAULT 0,
        created_at_ms INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS deposits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        amount INTEGER NOT NULL,
        created_at_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS deposits_by_user ON deposits (user_id);
    CREATE TABLE IF NOT EXISTS withdrawals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        amount INTEGER NOT NULL,
        address TEXT NOT NULL,
        reason TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at_ms INTEGER NOT NULL,
        processed_at_ms INTEGER
    );
    CREATE INDEX IF NOT EXISTS withdrawals_by_status ON withdrawals (status, created_at_ms);
    CREATE TABLE IF NOT EXISTS bonuses (
        user_id INTEGER PRIMARY KEY,
        bonus_balance INTEGER NOT NULL,
        total_rolled INTEGER NOT NULL DEFAULT 0,
        required_rollover INTEGER NOT NULL,
        converted INTEGER NOT NULL DEFAULT 0,
        created_at_ms INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS referrals (
        user_id INTEGER PRIMARY KEY,
        referral_code TEXT NOT NULL UNIQUE,
        referred_by INTEGER,
        total_deposits INTEGER NOT NULL DEFAULT 0,
        referral_earnings INTEGER NOT NULL DEFAULT 0,
        referral_count INTEGER NOT NULL DEFAULT 0,
        tier_level INTEGER NOT NULL DEFAULT 1,
        created_at_ms INTEGER NOT NULL
    );";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if needed) the database file at `path` and applies the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened ledger store");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::Poisoned)
    }

    /// Runs `f` against the connection without opening a transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Runs `f` inside a transaction. Dropping the transaction on an error rolls it back.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

pub(crate) fn to_i64(value: u64, label: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Corrupt(format!("{label} out of range: {value}")))
}

pub(crate) fn to_u64(value: i64, label: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Corrupt(format!("{label} negative: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn count_users(store: &Store) -> i64 {
        store
            .read(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
            })
            .unwrap()
    }

    #[test]
    fn test_write_commits_on_ok() {
        let store = Store::open_in_memory().unwrap();
        store
            .write(|tx| {
                tx.execute(
                    "INSERT INTO users (user_id, created_at_ms) VALUES (?1, ?2)",
                    params![1i64, 0i64],
                )?;
                Ok(())
            })
            .unwrap();
        assert_eq!(count_users(&store), 1);
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.write(|tx| {
            tx.execute(
                "INSERT INTO users (user_id, created_at_ms) VALUES (?1, ?2)",
                params![1i64, 0i64],
            )?;
            Err(Error::UserNotFound(1))
        });
        assert!(matches!(result, Err(Error::UserNotFound(1))));
        assert_eq!(count_users(&store), 0);
    }

    #[test]
    fn test_open_on_disk_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .write(|tx| {
                    tx.execute(
                        "INSERT INTO users (user_id, created_at_ms) VALUES (?1, ?2)",
                        params![9i64, 0i64],
                    )?;
                    Ok(())
                })
                .unwrap();
        }
        let reopened = Store::open(&path).unwrap();
        assert_eq!(count_users(&reopened), 1);
    }

    #[test]
    fn test_timestamp_conversions() {
        assert_eq!(to_i64(42, "ts").unwrap(), 42);
        assert!(matches!(to_i64(u64::MAX, "ts"), Err(Error::Corrupt(_))));
        assert!(matches!(to_u64(-1, "ts"), Err(Error::Corrupt(_))));
    }
}
