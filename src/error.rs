//! Error types for the outreach engine.

use crate::contacts::ContactStatus;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mail-search collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Search failed for query {query:?}: {reason}")]
    SearchFailed { query: String, reason: String },

    #[error("Thread {id} could not be loaded: {reason}")]
    ThreadFetch { id: String, reason: String },

    #[error("Mailbox unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the sequence/maintenance core.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Cannot {operation} contact {email}: status is {status}")]
    InvalidState {
        email: String,
        status: ContactStatus,
        operation: &'static str,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    #[error("Missing required configuration: {key}. {hint}")]
    ConfigMissing { key: String, hint: String },

    #[error("Unknown sequence: {0}")]
    UnknownSequence(String),
}

impl From<DatabaseError> for EngineError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::TransientIo(other.to_string()),
        }
    }
}

impl From<MailError> for EngineError {
    fn from(e: MailError) -> Self {
        EngineError::TransientIo(e.to_string())
    }
}

impl EngineError {
    /// The error raised when no contact store is connected.
    pub fn store_missing() -> Self {
        EngineError::ConfigMissing {
            key: "OUTREACH_DB_PATH".to_string(),
            hint: "Connect a contact store before running the engine.".to_string(),
        }
    }
}

