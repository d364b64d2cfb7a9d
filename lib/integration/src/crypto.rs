//! Sealing and opening of credential secrets.
//!
//! Decryption is a pure function behind the [`CredentialCipher`] trait; the
//! workflow engine never sees how secrets are protected, only that opening
//! a sealed value yields a non-empty plaintext or fails.

use crate::error::CredentialError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// An encrypted-at-rest secret value.
///
/// The inner string is an opaque ciphertext produced by a [`CredentialCipher`].
/// `Debug` intentionally shows the ciphertext, never a plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedSecret(String);

impl SealedSecret {
    /// Wraps an already-sealed ciphertext (e.g. read back from storage).
    #[must_use]
    pub fn from_ciphertext(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    /// Returns the ciphertext for storage.
    #[must_use]
    pub fn ciphertext(&self) -> &str {
        &self.0
    }
}

/// A pure seal/open pair for credential secrets.
pub trait CredentialCipher: Send + Sync {
    /// Seals a plaintext secret.
    fn seal(&self, plaintext: &str) -> Result<SealedSecret, CredentialError>;

    /// Opens a sealed secret, failing if the ciphertext is invalid or the
    /// plaintext is empty.
    fn open(&self, sealed: &SealedSecret) -> Result<String, CredentialError>;
}

/// Base64 obfuscation cipher.
///
/// Reference implementation used in tests and the demo engine. Production
/// deployments supply a real cipher behind the same trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Cipher;

impl CredentialCipher for Base64Cipher {
    fn seal(&self, plaintext: &str) -> Result<SealedSecret, CredentialError> {
        if plaintext.is_empty() {
            return Err(CredentialError::EncryptionFailed {
                reason: "refusing to seal an empty secret".to_string(),
            });
        }
        Ok(SealedSecret(BASE64.encode(plaintext.as_bytes())))
    }

    fn open(&self, sealed: &SealedSecret) -> Result<String, CredentialError> {
        let bytes = BASE64
            .decode(sealed.0.as_bytes())
            .map_err(|e| CredentialError::DecryptionFailed {
                reason: e.to_string(),
            })?;
        let plaintext =
            String::from_utf8(bytes).map_err(|e| CredentialError::DecryptionFailed {
                reason: e.to_string(),
            })?;
        if plaintext.is_empty() {
            return Err(CredentialError::DecryptionFailed {
                reason: "decryption yielded an empty secret".to_string(),
            });
        }
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let cipher = Base64Cipher;
        let sealed = cipher.seal("sk-live-abc123").expect("seal");
        assert_ne!(sealed.ciphertext(), "sk-live-abc123");
        assert_eq!(cipher.open(&sealed).expect("open"), "sk-live-abc123");
    }

    #[test]
    fn refuses_empty_plaintext() {
        let cipher = Base64Cipher;
        assert!(cipher.seal("").is_err());
    }

    #[test]
    fn open_rejects_garbage_ciphertext() {
        let cipher = Base64Cipher;
        let sealed = SealedSecret::from_ciphertext("!!not base64!!");
        assert!(cipher.open(&sealed).is_err());
    }

    #[test]
    fn sealed_secret_serde_is_transparent() {
        let cipher = Base64Cipher;
        let sealed = cipher.seal("secret").unwrap();
        let json = serde_json::to_string(&sealed).expect("serialize");
        let parsed: SealedSecret = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(sealed, parsed);
    }
}
