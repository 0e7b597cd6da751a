//! In-memory ledgers for tests.

use std::sync::Arc;

use crate::{ChaChaCipher, Ledger, Result, Store};

/// Fixed wallet cipher key so tests can decrypt what they provision.
pub const MOCK_CIPHER_KEY: [u8; 32] = [0x42; 32];

/// A ledger over a private in-memory database.
pub fn memory_ledger() -> Result<Ledger> {
    Ok(Ledger::new(
        Arc::new(Store::open_in_memory()?),
        Arc::new(ChaChaCipher::new(&MOCK_CIPHER_KEY)),
    ))
}
