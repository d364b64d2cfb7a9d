//! Credential vault and provider integration boundary for amber-relay.
//!
//! This crate provides:
//!
//! - **Credential vault**: Encrypted storage for LLM provider API keys,
//!   looked up scoped to the owning user
//! - **Cipher seam**: The pure seal/open boundary the engine uses to
//!   decrypt credentials at execution time

pub mod credential;
pub mod crypto;
pub mod error;

pub use credential::{Credential, CredentialProvider, CredentialVault, InMemoryVault};
pub use crypto::{Base64Cipher, CredentialCipher, SealedSecret};
pub use error::CredentialError;
