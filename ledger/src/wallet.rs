//! Custodial keypairs and the cipher that protects their secrets at rest.

use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use ed25519_dalek::SigningKey;
use rand_core::{OsRng, RngCore};

use crate::{Error, Result};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Symmetric protection for wallet secrets.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String>;
    fn decrypt(&self, token: &str) -> Result<Vec<u8>>;
}

/// ChaCha20-Poly1305 with a random nonce per secret.
///
/// Tokens are `base64(nonce || ciphertext)`.
pub struct ChaChaCipher {
    cipher: ChaCha20Poly1305,
}

impl ChaChaCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Builds a cipher from a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| Error::Wallet(format!("cipher key is not base64: {err}")))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| Error::Wallet(format!("cipher key must be {KEY_LEN} bytes")))?;
        Ok(Self::new(&key))
    }

    /// Fresh base64 key suitable for `from_base64`.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        general_purpose::STANDARD.encode(key)
    }
}

impl SecretCipher for ChaChaCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::Wallet("encrypt failed".to_string()))?;
        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(token))
    }

    fn decrypt(&self, token: &str) -> Result<Vec<u8>> {
        let bytes = general_purpose::STANDARD
            .decode(token)
            .map_err(|err| Error::Wallet(format!("secret token is not base64: {err}")))?;
        if bytes.len() <= NONCE_LEN {
            return Err(Error::Wallet("secret token too short".to_string()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Wallet("decrypt failed".to_string()))
    }
}

/// A freshly generated ed25519 wallet.
pub struct Keypair {
    /// base58 public key.
    pub address: String,
    /// 32-byte seed followed by the 32-byte public key.
    pub secret: [u8; 64],
}

pub fn generate_keypair() -> Keypair {
    let signing = SigningKey::generate(&mut OsRng);
    Keypair {
        address: bs58::encode(signing.verifying_key().as_bytes()).into_string(),
        secret: signing.to_keypair_bytes(),
    }
}

/// Recovers the address from a 64-byte secret, rejecting mismatched halves.
pub fn address_from_secret(secret: &[u8]) -> Result<String> {
    let bytes: &[u8; 64] = secret
        .try_into()
        .map_err(|_| Error::Wallet(format!("secret must be 64 bytes, got {}", secret.len())))?;
    let signing = SigningKey::from_keypair_bytes(bytes)
        .map_err(|err| Error::Wallet(format!("invalid keypair: {err}")))?;
    Ok(bs58::encode(signing.verifying_key().as_bytes()).into_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_roundtrip() {
        let cipher = ChaChaCipher::from_base64(&ChaChaCipher::generate_key()).unwrap();
        let token = cipher.encrypt(b"secret bytes").unwrap();
        assert_eq!(cipher.decrypt(&token).unwrap(), b"secret bytes");
    }

    #[test]
    fn test_cipher_uses_fresh_nonces() {
        let cipher = ChaChaCipher::new(&[3u8; 32]);
        assert_ne!(cipher.encrypt(b"x").unwrap(), cipher.encrypt(b"x").unwrap());
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let token = ChaChaCipher::new(&[1u8; 32]).encrypt(b"x").unwrap();
        let other = ChaChaCipher::new(&[2u8; 32]);
        assert!(matches!(other.decrypt(&token), Err(Error::Wallet(_))));
        assert!(matches!(other.decrypt("AAAA"), Err(Error::Wallet(_))));
        assert!(matches!(other.decrypt("not base64!"), Err(Error::Wallet(_))));
    }

    #[test]
    fn test_bad_cipher_keys_rejected() {
        assert!(ChaChaCipher::from_base64("short").is_err());
        let fifteen = general_purpose::STANDARD.encode([0u8; 15]);
        assert!(ChaChaCipher::from_base64(&fifteen).is_err());
    }

    #[test]
    fn test_generated_keypair_address_matches_secret() {
        let keypair = generate_keypair();
        assert_eq!(address_from_secret(&keypair.secret).unwrap(), keypair.address);
        let decoded = bs58::decode(&keypair.address).into_vec().unwrap();
        assert_eq!(decoded.len(), 32);
        assert!(address_from_secret(&keypair.secret[..32]).is_err());
    }
}
