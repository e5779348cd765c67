use thiserror::Error;

use crate::jobs::JobId;

#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("A job with ID {0} already exists.")]
    DuplicateJob(JobId),

    #[error("Sorry no job with ID {0}.")]
    JobNotFound(JobId),

    #[error("This job is already completed, please start a new job.")]
    AlreadyCompleted(JobId),

    #[error("Storage failure: {0}")]
    PersistStore(String),

    #[error("Could not reach conversation {conversation}: {reason}")]
    ResumeUnreachable {
        conversation: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HeraldError {
    /// Text shown in the conversation that triggered the failing operation.
    pub fn user_message(&self) -> String {
        match self {
            HeraldError::ResumeUnreachable { .. } => {
                format!("Job completed, but the notification could not be delivered. {self}")
            }
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for HeraldError {
    fn from(err: StorageError) -> Self {
        HeraldError::PersistStore(err.to_string())
    }
}

/// Failures raised by a [`Storage`](crate::storage::Storage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write precondition did not match the stored version.
    #[error("version conflict on key {key}")]
    Conflict { key: String },

    #[error("IO error on key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on key {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, HeraldError>;
