//! Postgres credential vault.
//!
//! Secrets are stored sealed; the engine opens them through the cipher at
//! execution time and never writes a plaintext back.

use amber_relay_core::{CredentialId, UserId};
use amber_relay_integration::{
    Credential, CredentialError, CredentialProvider, CredentialVault, SealedSecret,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Repository for stored credentials.
pub struct PostgresVault {
    pool: PgPool,
}

impl PostgresVault {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct CredentialRow {
    id: String,
    user_id: String,
    name: String,
    provider: String,
    secret: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CredentialRow {
    fn try_into_credential(self) -> Result<(Credential, SealedSecret), CredentialError> {
        let storage = |detail: String| CredentialError::StorageFailed { reason: detail };

        let id = CredentialId::from_str(&self.id)
            .map_err(|e| storage(format!("invalid credential id '{}': {e}", self.id)))?;
        let user_id = UserId::from_str(&self.user_id)
            .map_err(|e| storage(format!("invalid user id '{}': {e}", self.user_id)))?;
        let provider = match self.provider.as_str() {
            "gemini" => CredentialProvider::Gemini,
            "openai" => CredentialProvider::OpenAi,
            "anthropic" => CredentialProvider::Anthropic,
            other => return Err(storage(format!("unknown provider '{other}'"))),
        };

        Ok((
            Credential {
                id,
                user_id,
                name: self.name,
                provider,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            SealedSecret::from_ciphertext(self.secret),
        ))
    }
}

fn storage_err(err: sqlx::Error) -> CredentialError {
    CredentialError::StorageFailed {
        reason: err.to_string(),
    }
}

#[async_trait]
impl CredentialVault for PostgresVault {
    async fn find(
        &self,
        id: CredentialId,
        user_id: UserId,
    ) -> Result<Option<(Credential, SealedSecret)>, CredentialError> {
        let row: Option<CredentialRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, name, provider, secret, created_at, updated_at
            FROM credentials
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(CredentialRow::try_into_credential).transpose()
    }

    async fn store(
        &self,
        credential: Credential,
        secret: SealedSecret,
    ) -> Result<CredentialId, CredentialError> {
        sqlx::query(
            r#"
            INSERT INTO credentials (id, user_id, name, provider, secret, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, secret = EXCLUDED.secret, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(credential.id.to_string())
        .bind(credential.user_id.to_string())
        .bind(&credential.name)
        .bind(credential.provider.as_str())
        .bind(secret.ciphertext())
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(credential.id)
    }

    async fn delete(&self, id: CredentialId, user_id: UserId) -> Result<(), CredentialError> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = $1 AND user_id = $2")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(CredentialError::NotFound { id });
        }
        Ok(())
    }
}
