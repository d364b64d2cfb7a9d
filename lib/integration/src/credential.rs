//! Credential vault for secure credential storage.
//!
//! LLM provider API keys are stored encrypted at rest and looked up scoped
//! to their owning user. No plaintext credentials are stored in workflow
//! configuration; nodes reference credentials by ID only.

use crate::crypto::SealedSecret;
use crate::error::CredentialError;
use amber_relay_core::{CredentialId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The LLM provider a credential belongs to.
///
/// Credentials are scoped per provider so node configuration dialogs only
/// offer credentials of the matching kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialProvider {
    /// Google Gemini API key.
    Gemini,
    /// OpenAI API key.
    OpenAi,
    /// Anthropic API key.
    Anthropic,
}

impl CredentialProvider {
    /// Returns a stable string tag for this provider.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

/// A stored credential (metadata only; the secret lives in a [`SealedSecret`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Unique identifier.
    pub id: CredentialId,
    /// The user who owns this credential.
    pub user_id: UserId,
    /// Credential name/label shown in the editor.
    pub name: String,
    /// The provider this credential authenticates against.
    pub provider: CredentialProvider,
    /// When the credential was created.
    pub created_at: DateTime<Utc>,
    /// When the credential was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Creates a new credential.
    #[must_use]
    pub fn new(user_id: UserId, name: impl Into<String>, provider: CredentialProvider) -> Self {
        let now = Utc::now();
        Self {
            id: CredentialId::new(),
            user_id,
            name: name.into(),
            provider,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trait for credential storage.
///
/// Implementations must encrypt secret values at rest. Lookups are always
/// scoped to the owning user: a credential ID belonging to another user
/// resolves to `None`, indistinguishable from a missing credential.
#[async_trait]
pub trait CredentialVault: Send + Sync {
    /// Finds a credential and its sealed secret by ID, scoped to `user_id`.
    async fn find(
        &self,
        id: CredentialId,
        user_id: UserId,
    ) -> Result<Option<(Credential, SealedSecret)>, CredentialError>;

    /// Stores a credential with its sealed secret.
    async fn store(
        &self,
        credential: Credential,
        secret: SealedSecret,
    ) -> Result<CredentialId, CredentialError>;

    /// Deletes a credential owned by `user_id`.
    async fn delete(&self, id: CredentialId, user_id: UserId) -> Result<(), CredentialError>;
}

/// In-memory credential vault.
///
/// Used in tests and by the demo engine; secrets are held sealed, so the
/// at-rest representation matches a real backing store.
#[derive(Clone, Default)]
pub struct InMemoryVault {
    entries: Arc<Mutex<HashMap<CredentialId, (Credential, SealedSecret)>>>,
}

impl InMemoryVault {
    /// Creates an empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialVault for InMemoryVault {
    async fn find(
        &self,
        id: CredentialId,
        user_id: UserId,
    ) -> Result<Option<(Credential, SealedSecret)>, CredentialError> {
        let entries = self.entries.lock().expect("vault lock poisoned");
        Ok(entries
            .get(&id)
            .filter(|(credential, _)| credential.user_id == user_id)
            .cloned())
    }

    async fn store(
        &self,
        credential: Credential,
        secret: SealedSecret,
    ) -> Result<CredentialId, CredentialError> {
        let id = credential.id;
        let mut entries = self.entries.lock().expect("vault lock poisoned");
        entries.insert(id, (credential, secret));
        Ok(id)
    }

    async fn delete(&self, id: CredentialId, user_id: UserId) -> Result<(), CredentialError> {
        let mut entries = self.entries.lock().expect("vault lock poisoned");
        match entries.get(&id) {
            Some((credential, _)) if credential.user_id == user_id => {
                entries.remove(&id);
                Ok(())
            }
            _ => Err(CredentialError::NotFound { id }),
        }
    }
}
