//! Error types for the engine
//!
//! Only declaration, configuration and synchronizer problems surface here.
//! Spec failures are recorded on the spec and never unwind past it.

use spectree_common::{CodeLocation, ConfigErrors};
use spectree_sync::SyncError;
use thiserror::Error;

/// Malformed spec tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}{}", .location.as_ref().map(|l| format!(" at {l}")).unwrap_or_default())]
pub struct DeclarationError {
    pub message: String,
    pub location: Option<CodeLocation>,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    #[error("{0}")]
    Config(#[from] ConfigErrors),

    #[error("Parallel synchronization failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Failed to start step thread: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
