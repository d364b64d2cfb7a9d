//! Error types for the integration crate.

use amber_relay_core::CredentialId;
use std::fmt;

/// Errors from credential operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Credential not found, or not owned by the requesting user.
    NotFound { id: CredentialId },
    /// Encryption failed.
    EncryptionFailed { reason: String },
    /// Decryption failed or produced an empty secret.
    DecryptionFailed { reason: String },
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => {
                write!(f, "credential not found: {id}")
            }
            Self::EncryptionFailed { reason } => {
                write!(f, "encryption failed: {reason}")
            }
            Self::DecryptionFailed { reason } => {
                write!(f, "decryption failed: {reason}")
            }
            Self::StorageFailed { reason } => {
                write!(f, "storage operation failed: {reason}")
            }
        }
    }
}

impl std::error::Error for CredentialError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_error_display() {
        let id = CredentialId::new();
        let err = CredentialError::NotFound { id };
        assert!(err.to_string().contains("credential not found"));
    }

    #[test]
    fn decryption_error_display() {
        let err = CredentialError::DecryptionFailed {
            reason: "empty secret".to_string(),
        };
        assert!(err.to_string().contains("decryption failed"));
    }
}
