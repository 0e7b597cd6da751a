//! Chain balance lookups for the ledger backend.
//!
//! [`RpcClient`] talks Solana JSON-RPC. Callers that only need balances depend on the
//! [`BalanceOracle`] trait so tests can swap in a fixed table.

mod backoff;
pub mod rpc;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use rpc::{RetryPolicy, RpcClient};

use futures::future::BoxFuture;
use surfsol_types::Amount;
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected response")]
    UnexpectedResponse,
    #[error("balance out of range: {0} lamports")]
    BalanceOutOfRange(u64),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Anything that can report the on-chain balance of a wallet address.
pub trait BalanceOracle: Send + Sync {
    fn balance<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Amount>>;
}
