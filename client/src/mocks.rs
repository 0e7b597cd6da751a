//! Fixed balance table standing in for the chain.

use futures::future::{self, BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use surfsol_types::Amount;

use crate::{BalanceOracle, Error, Result};

/// Returns configured balances; unknown addresses hold zero.
#[derive(Default)]
pub struct StaticBalanceOracle {
    balances: Mutex<HashMap<String, Amount>>,
    failing: Mutex<HashSet<String>>,
}

impl StaticBalanceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: &str, amount: Amount) {
        if let Ok(mut balances) = self.balances.lock() {
            balances.insert(address.to_string(), amount);
        }
    }

    /// Makes lookups for `address` fail with an RPC error.
    pub fn fail(&self, address: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(address.to_string());
        }
    }

    fn lookup(&self, address: &str) -> Result<Amount> {
        let failing = self
            .failing
            .lock()
            .map(|failing| failing.contains(address))
            .unwrap_or(false);
        if failing {
            return Err(Error::Rpc {
                code: -32000,
                message: format!("balance unavailable for {address}"),
            });
        }
        Ok(self
            .balances
            .lock()
            .ok()
            .and_then(|balances| balances.get(address).copied())
            .unwrap_or_default())
    }
}

impl BalanceOracle for StaticBalanceOracle {
    fn balance<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Amount>> {
        future::ready(self.lookup(address)).boxed()
    }
}
