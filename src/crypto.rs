use anyhow::{bail, Result};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Key, XChaCha20Poly1305,
};

const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Encrypts bank token material before it hits the database. Ciphertext is
/// stored as base64(nonce || box) in the text columns of `bank_connections`.
pub struct TokenCipher {
    cipher: XChaCha20Poly1305,
}

impl TokenCipher {
    /// Build from a base64-encoded 32-byte key (the `TOKEN_KEY` env var).
    pub fn from_key_b64(key_b64: &str) -> Result<Self> {
        let bytes = B64.decode(key_b64.trim())?;
        if bytes.len() != KEY_LEN {
            bail!("token key must be {KEY_LEN} bytes, got {}", bytes.len());
        }
        Ok(Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(&bytes)),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext.as_bytes())?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(B64.encode(out))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let raw = B64.decode(stored)?;
        if raw.len() < NONCE_LEN {
            bail!("stored token too short for nonce");
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self.cipher.decrypt(nonce.into(), ciphertext)?;
        Ok(String::from_utf8(plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, RngCore, SeedableRng};

    fn cipher(seed: u64) -> TokenCipher {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut key_bytes = [0u8; KEY_LEN];
        rng.fill_bytes(&mut key_bytes);
        TokenCipher::from_key_b64(&B64.encode(key_bytes)).unwrap()
    }

    #[test]
    fn roundtrip() {
        let cipher = cipher(1);
        let stored = cipher.encrypt("sandbox-access-token").unwrap();
        assert_ne!(stored, "sandbox-access-token");
        assert_eq!(cipher.decrypt(&stored).unwrap(), "sandbox-access-token");
    }

    #[test]
    fn empty_token_roundtrip() {
        let cipher = cipher(1);
        let stored = cipher.encrypt("").unwrap();
        assert_eq!(cipher.decrypt(&stored).unwrap(), "");
    }

    #[test]
    fn two_encryptions_differ() {
        // Fresh nonce per encryption, so identical plaintexts must not
        // produce identical ciphertexts.
        let cipher = cipher(1);
        let a = cipher.encrypt("T1").unwrap();
        let b = cipher.encrypt("T1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let cipher = cipher(1);
        let stored = cipher.encrypt("T1").unwrap();
        let mut raw = B64.decode(&stored).unwrap();
        raw[NONCE_LEN + 1] ^= 1;
        assert!(cipher.decrypt(&B64.encode(raw)).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let stored = cipher(1).encrypt("T1").unwrap();
        assert!(cipher(2).decrypt(&stored).is_err());
    }

    #[test]
    fn too_short_ciphertext_fails() {
        let cipher = cipher(1);
        assert!(cipher.decrypt(&B64.encode([0u8; 4])).is_err());
    }

    #[test]
    fn rejects_bad_key_length() {
        assert!(TokenCipher::from_key_b64(&B64.encode([0u8; 16])).is_err());
    }
}
