use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::DeliveryError;

/// Fixed associated data binding every sealed credential to this one concern,
/// so a sealed blob copied into an unrelated field cannot be decrypted there.
const AAD: &[u8] = b"geofence-delivery-adapter-credential";

/// Seals/opens adapter credentials at rest with a process-wide AES-256-GCM
/// key (§4.6). Credentials are decrypted only at the moment of use, never
/// held in plaintext longer than a single dispatch call.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    pub fn new(key: [u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key);
        Self { cipher: Aes256Gcm::new(key) }
    }

    /// Returns `base64(nonce || ciphertext)`.
    pub fn seal(&self, plaintext: &str) -> Result<String, DeliveryError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, aes_gcm::aead::Payload { msg: plaintext.as_bytes(), aad: AAD })
            .map_err(|e| DeliveryError::Crypto(e.to_string()))?;
        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<String, DeliveryError> {
        let raw = BASE64
            .decode(sealed)
            .map_err(|e| DeliveryError::Crypto(format!("bad base64: {e}")))?;
        if raw.len() < 12 {
            return Err(DeliveryError::Crypto("sealed value too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, aes_gcm::aead::Payload { msg: ciphertext, aad: AAD })
            .map_err(|e| DeliveryError::Crypto(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|e| DeliveryError::Crypto(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let cipher = CredentialCipher::new([7u8; 32]);
        let sealed = cipher.seal("super-secret-api-token").unwrap();
        assert_ne!(sealed, "super-secret-api-token");
        let opened = cipher.open(&sealed).unwrap();
        assert_eq!(opened, "super-secret-api-token");
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let a = CredentialCipher::new([7u8; 32]);
        let b = CredentialCipher::new([9u8; 32]);
        let sealed = a.seal("top-secret").unwrap();
        assert!(b.open(&sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let cipher = CredentialCipher::new([1u8; 32]);
        let sealed = cipher.seal("value").unwrap();
        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let tampered = BASE64.encode(raw);
        assert!(cipher.open(&tampered).is_err());
    }
}
