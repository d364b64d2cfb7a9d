//! Core domain types and utilities for the amber-relay platform.
//!
//! This crate provides the foundational ID types and error handling used
//! throughout the amber-relay workflow automation engine.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{CredentialId, EventId, ExecutionId, ParseIdError, UserId, WorkflowId};
