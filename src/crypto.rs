//! AES-256-GCM codec for API key secrets.
//!
//! Wire form is base64(nonce || ciphertext). The 32-byte master key comes
//! from the environment as base64 and is zeroized after cipher construction.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("master key must be 32 bytes of base64")]
    BadMasterKey,
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext is malformed or was produced with a different key")]
    Decrypt,
}

pub struct SecretCodec {
    cipher: Aes256Gcm,
}

impl SecretCodec {
    /// Build a codec from a base64-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let mut key = STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::BadMasterKey)?;
        if key.len() != 32 {
            key.zeroize();
            return Err(CryptoError::BadMasterKey);
        }
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::BadMasterKey)?;
        key.zeroize();
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let data = STANDARD.decode(encoded).map_err(|_| CryptoError::Decrypt)?;
        if data.len() < NONCE_LEN + 16 {
            return Err(CryptoError::Decrypt);
        }

        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
        let mut plaintext = self
            .cipher
            .decrypt(nonce, &data[NONCE_LEN..])
            .map_err(|_| CryptoError::Decrypt)?;

        let text = String::from_utf8(plaintext.clone()).map_err(|_| CryptoError::Decrypt);
        plaintext.zeroize();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_codec() -> SecretCodec {
        SecretCodec::from_base64_key(&STANDARD.encode([7u8; 32])).unwrap()
    }

    #[test]
    fn roundtrip() {
        let codec = test_codec();
        let encrypted = codec.encrypt("sk-test-0123456789abcdef").unwrap();
        assert_ne!(encrypted, "sk-test-0123456789abcdef");
        assert_eq!(codec.decrypt(&encrypted).unwrap(), "sk-test-0123456789abcdef");
    }

    #[test]
    fn different_encryptions_differ() {
        let codec = test_codec();
        let a = codec.encrypt("same-secret").unwrap();
        let b = codec.encrypt("same-secret").unwrap();
        // Random nonce per call
        assert_ne!(a, b);
        assert_eq!(codec.decrypt(&a).unwrap(), codec.decrypt(&b).unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let codec = test_codec();
        let other = SecretCodec::from_base64_key(&STANDARD.encode([8u8; 32])).unwrap();
        let encrypted = codec.encrypt("secret").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn garbage_input_fails() {
        let codec = test_codec();
        assert!(codec.decrypt("not base64 !!!").is_err());
        assert!(codec.decrypt(&STANDARD.encode(b"short")).is_err());
    }

    #[test]
    fn bad_master_key_rejected() {
        assert!(SecretCodec::from_base64_key("tooshort").is_err());
        assert!(SecretCodec::from_base64_key(&STANDARD.encode([1u8; 16])).is_err());
    }
}
