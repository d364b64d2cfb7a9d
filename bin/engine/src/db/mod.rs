//! Database repositories for the engine.
//!
//! Postgres-backed implementations of the workflow engine's storage
//! collaborators. IDs are stored in their prefixed display form.

pub mod credential;
pub mod execution;
pub mod workflow;

pub use credential::PostgresVault;
pub use execution::PostgresExecutionStore;
pub use workflow::PostgresGraphStore;

use amber_relay_workflow::StoreError;

pub(crate) fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend {
        detail: err.to_string(),
    }
}
