//! Credential vault types and the sealing cipher.
//!
//! API keys and secrets are sealed with ChaCha20-Poly1305 under a
//! master key supplied by configuration. Each sealed field carries its
//! own random nonce; the authentication tag lives inside the AEAD
//! ciphertext. Rows are never deleted: rotation deactivates the old
//! record, inserts a new active one, and both moves land in the audit
//! log.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// ChaCha20-Poly1305 nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Master key length in bytes.
const KEY_LEN: usize = 32;

/// A single encrypted field: base64 ciphertext plus its base64 nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// Base64 AEAD ciphertext (authentication tag included).
    pub ciphertext: String,
    /// Base64 nonce used for this field alone.
    pub nonce: String,
}

/// Stored credential row, fields still sealed.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    /// Row identifier.
    pub id: uuid::Uuid,
    /// Downstream service the credential authenticates against.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Sealed API key.
    pub sealed_key: SealedSecret,
    /// Sealed API secret, when the service uses one.
    pub sealed_secret: Option<SealedSecret>,
    /// Whether this is the active record for (service, environment).
    pub is_active: bool,
    /// Expiry; an active record past this fails `CredentialExpired`.
    pub expires_at: Option<DateTime<Utc>>,
    /// When this record superseded a previous one.
    pub last_rotated_at: Option<DateTime<Utc>>,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Whether the credential is past its expiry (strictly before `now`).
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t < now)
    }
}

/// Decrypted view of the active credential for a (service, environment).
#[derive(Debug, Clone, Serialize)]
pub struct ActiveCredential {
    /// Downstream service name.
    pub service_name: String,
    /// Deployment environment.
    pub environment: String,
    /// Decrypted API key.
    pub api_key: String,
    /// Decrypted API secret, when present.
    pub api_secret: Option<String>,
    /// Expiry of the active record.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the record was last rotated in.
    pub last_rotated_at: Option<DateTime<Utc>>,
}

/// Audit trail action for credential lifecycle moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialAuditAction {
    /// First record stored for a (service, environment).
    Create,
    /// New record rotated in over an existing one.
    Rotate,
    /// Old record deactivated by a rotation.
    Deactivate,
}

impl CredentialAuditAction {
    /// Returns the action as its stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Rotate => "rotate",
            Self::Deactivate => "deactivate",
        }
    }
}

impl fmt::Display for CredentialAuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seals and opens credential fields under the configured master key.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: ChaCha20Poly1305,
}

impl CredentialCipher {
    /// Builds a cipher from a base64-encoded 32-byte master key.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CryptoError`] when the key is not valid
    /// base64 or does not decode to exactly 32 bytes.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, GatewayError> {
        let key = BASE64_STANDARD
            .decode(key_b64)
            .map_err(|_| GatewayError::CryptoError("master key is not valid base64".to_string()))?;
        if key.len() != KEY_LEN {
            return Err(GatewayError::CryptoError(format!(
                "master key must decode to {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|_| GatewayError::CryptoError("master key rejected by cipher".to_string()))?;
        Ok(Self { cipher })
    }

    /// Seals a plaintext field under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CryptoError`] when encryption fails.
    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, GatewayError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| GatewayError::CryptoError("credential encryption failed".to_string()))?;
        Ok(SealedSecret {
            ciphertext: BASE64_STANDARD.encode(ciphertext),
            nonce: BASE64_STANDARD.encode(nonce),
        })
    }

    /// Opens a sealed field back to its plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CryptoError`] when the base64 is
    /// malformed, the nonce has the wrong length, or authentication
    /// fails (wrong key or tampered ciphertext).
    pub fn open(&self, sealed: &SealedSecret) -> Result<String, GatewayError> {
        let ciphertext = BASE64_STANDARD
            .decode(&sealed.ciphertext)
            .map_err(|_| GatewayError::CryptoError("ciphertext is not valid base64".to_string()))?;
        let nonce = BASE64_STANDARD
            .decode(&sealed.nonce)
            .map_err(|_| GatewayError::CryptoError("nonce is not valid base64".to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(GatewayError::CryptoError(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce.len()
            )));
        }
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| GatewayError::CryptoError("credential decryption failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| GatewayError::CryptoError("decrypted credential is not UTF-8".to_string()))
    }
}

// Never expose key material through Debug.
impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        let key = BASE64_STANDARD.encode([7u8; KEY_LEN]);
        let Ok(cipher) = CredentialCipher::from_base64_key(&key) else {
            panic!("cipher construction failed");
        };
        cipher
    }

    #[test]
    fn seal_open_round_trip() {
        let cipher = cipher();
        let Ok(sealed) = cipher.seal("sk_live_12345") else {
            panic!("seal failed");
        };
        let Ok(opened) = cipher.open(&sealed) else {
            panic!("open failed");
        };
        assert_eq!(opened, "sk_live_12345");
    }

    #[test]
    fn each_seal_uses_a_fresh_nonce() {
        let cipher = cipher();
        let Ok(a) = cipher.seal("same-secret") else {
            panic!("seal failed");
        };
        let Ok(b) = cipher.seal("same-secret") else {
            panic!("seal failed");
        };
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let cipher = cipher();
        let Ok(mut sealed) = cipher.seal("sk_live_12345") else {
            panic!("seal failed");
        };
        sealed.ciphertext = BASE64_STANDARD.encode(b"not the real ciphertext");
        assert!(cipher.open(&sealed).is_err());
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let cipher = cipher();
        let Ok(sealed) = cipher.seal("sk_live_12345") else {
            panic!("seal failed");
        };
        let other_key = BASE64_STANDARD.encode([9u8; KEY_LEN]);
        let Ok(other) = CredentialCipher::from_base64_key(&other_key) else {
            panic!("cipher construction failed");
        };
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn rejects_short_master_key() {
        let short = BASE64_STANDARD.encode([1u8; 16]);
        assert!(CredentialCipher::from_base64_key(&short).is_err());
        assert!(CredentialCipher::from_base64_key("not base64!!").is_err());
    }

    #[test]
    fn expiry_is_strictly_before_now() {
        let now = Utc::now();
        let record = CredentialRecord {
            id: uuid::Uuid::new_v4(),
            service_name: "booking-api".to_string(),
            environment: "production".to_string(),
            sealed_key: SealedSecret {
                ciphertext: String::new(),
                nonce: String::new(),
            },
            sealed_secret: None,
            is_active: true,
            expires_at: Some(now),
            last_rotated_at: None,
            created_at: now,
        };
        assert!(!record.is_expired(now));
        assert!(record.is_expired(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn audit_action_strings() {
        assert_eq!(CredentialAuditAction::Create.as_str(), "create");
        assert_eq!(CredentialAuditAction::Rotate.as_str(), "rotate");
        assert_eq!(CredentialAuditAction::Deactivate.as_str(), "deactivate");
    }
}
