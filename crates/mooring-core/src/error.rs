//! Error types for mooring-core

use thiserror::Error;

use crate::models::EntityKind;

/// Result type alias using mooring-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mooring-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity missing from the local store
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Queue item missing from the local store
    #[error("Queue item not found: {0}")]
    QueueItemNotFound(i64),

    /// Entity name that is not part of the registry
    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the current queue/sync state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Network-level failure talking to the remote authority
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote authority answered with a non-success status
    #[error("Remote error: {message} ({status})")]
    Remote { status: u16, message: String },

    /// Delta pull requested before the first bootstrap
    #[error("Local store has not been bootstrapped yet")]
    NotBootstrapped,

    /// Bootstrap requested although a sync-state record exists
    #[error("Local store is already bootstrapped (last sync {0})")]
    AlreadyBootstrapped(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether this error came from the network rather than local storage.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Remote { .. })
    }
}
