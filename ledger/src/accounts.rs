use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use surfsol_types::{now_ms, validate_locale, User, UserId, WalletProvision};
use tracing::info;

use crate::store::{to_i64, to_u64, Store};
use crate::wallet::{address_from_secret, generate_keypair, SecretCipher};
use crate::{Error, Result};

const USER_COLUMNS: &str = "user_id, address, encrypted_secret, locale, verified, created_at_ms";

/// Users and their custodial wallets.
#[derive(Clone)]
pub struct AccountRegistry {
    store: Arc<Store>,
    cipher: Arc<dyn SecretCipher>,
}

impl AccountRegistry {
    pub fn new(store: Arc<Store>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self { store, cipher }
    }

    /// Creates the user on first contact. Existing users are returned untouched.
    pub fn register(&self, user_id: UserId, locale: Option<&str>) -> Result<User> {
        if let Some(locale) = locale {
            validate_locale(locale)?;
        }
        let (user, created) = self.store.write(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO users (user_id, locale, verified, created_at_ms)
                 VALUES (?1, ?2, 0, ?3)",
                params![user_id, locale, to_i64(now_ms(), "user created_at_ms")?],
            )?;
            Ok((require_user(tx, user_id)?, inserted == 1))
        })?;
        if created {
            info!(user_id, locale = user.locale_or_default(), "user registered");
        }
        Ok(user)
    }

    pub fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        self.store.read(|conn| load_user(conn, user_id))
    }

    pub fn set_locale(&self, user_id: UserId, locale: &str) -> Result<User> {
        validate_locale(locale)?;
        self.store.write(|tx| {
            let updated = tx.execute(
                "UPDATE users SET locale = ?1 WHERE user_id = ?2",
                params![locale, user_id],
            )?;
            if updated == 0 {
                return Err(Error::UserNotFound(user_id));
            }
            require_user(tx, user_id)
        })
    }

    /// Records that the user confirmed they are of age.
    pub fn verify_age(&self, user_id: UserId) -> Result<User> {
        let user = self.store.write(|tx| {
            let updated = tx.execute(
                "UPDATE users SET verified = 1 WHERE user_id = ?1",
                params![user_id],
            )?;
            if updated == 0 {
                return Err(Error::UserNotFound(user_id));
            }
            require_user(tx, user_id)
        })?;
        info!(user_id, "age verified");
        Ok(user)
    }

    /// Generates and stores a wallet unless the user already has one.
    pub fn provision_wallet(&self, user_id: UserId) -> Result<WalletProvision> {
        let provision = self.store.write(|tx| {
            let user = require_user(tx, user_id)?;
            if let Some(address) = user.address {
                return Ok(WalletProvision {
                    address,
                    created: false,
                });
            }
            let keypair = generate_keypair();
            let token = self.cipher.encrypt(&keypair.secret)?;
            tx.execute(
                "UPDATE users SET address = ?1, encrypted_secret = ?2 WHERE user_id = ?3",
                params![keypair.address, token, user_id],
            )?;
            Ok(WalletProvision {
                address: keypair.address,
                created: true,
            })
        })?;
        if provision.created {
            info!(user_id, address = %provision.address, "wallet provisioned");
        }
        Ok(provision)
    }

    /// Decrypts the wallet secret and renders it base58, or `None` without a wallet.
    pub fn export_secret(&self, user_id: UserId) -> Result<Option<String>> {
        let user = self.store.read(|conn| require_user(conn, user_id))?;
        let (Some(address), Some(token)) = (user.address, user.encrypted_secret) else {
            return Ok(None);
        };
        let secret = self.cipher.decrypt(&token)?;
        if address_from_secret(&secret)? != address {
            return Err(Error::Wallet(format!(
                "stored secret does not match address for user {user_id}"
            )));
        }
        info!(user_id, "wallet secret exported");
        Ok(Some(bs58::encode(secret).into_string()))
    }

    /// Users that own a wallet, by id.
    pub fn wallet_holders(&self) -> Result<Vec<User>> {
        self.store.read(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE address IS NOT NULL ORDER BY user_id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], read_row)?;
            let mut users = Vec::new();
            for row in rows {
                users.push(into_user(row?)?);
            }
            Ok(users)
        })
    }
}

type UserRow = (
    UserId,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    i64,
);

fn read_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_user(row: UserRow) -> Result<User> {
    let (user_id, address, encrypted_secret, locale, verified, created_at_ms) = row;
    Ok(User {
        user_id,
        address,
        encrypted_secret,
        locale,
        verified,
        created_at_ms: to_u64(created_at_ms, "user created_at_ms")?,
    })
}

fn load_user(conn: &Connection, user_id: UserId) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1");
    conn.query_row(&sql, params![user_id], read_row)
        .optional()?
        .map(into_user)
        .transpose()
}

fn require_user(conn: &Connection, user_id: UserId) -> Result<User> {
    load_user(conn, user_id)?.ok_or(Error::UserNotFound(user_id))
}
