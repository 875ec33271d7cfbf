use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] mooring_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid field '{0}': expected key=value")]
    InvalidField(String),
    #[error("No changes provided")]
    EmptyChanges,
    #[error("Entity ID cannot be empty")]
    EmptyEntityId,
    #[error("{0} not found: {1}")]
    EntityNotFound(String, String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Remote is not configured. Run `mooring config init --api-url <URL>` or set MOORING_API_URL."
    )]
    SyncNotConfigured,
}
