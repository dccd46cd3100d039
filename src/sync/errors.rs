use thiserror::Error;

use uuid::Uuid;

use crate::engine::types::TableId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("path `{path}` does not exist")]
    PathNotFound { path: String },
    #[error("operation at `{path}` expects {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("numeric operation at `{path}` would go negative")]
    NegativeResult { path: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {session_id} not found")]
    SessionNotFound { session_id: Uuid },
    #[error("resume token rejected: {reason}")]
    InvalidResumeToken { reason: String },
    #[error("resume token expired at {expired_at}")]
    ResumeTokenExpired { expired_at: chrono::DateTime<chrono::Utc> },
    #[error("session {session_id} exhausted its {max_attempts} reconnect attempts")]
    MaxReconnectAttemptsExceeded { session_id: Uuid, max_attempts: u32 },
    #[error("session {session_id} is not resumable")]
    SessionNotResumable { session_id: Uuid },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("table `{table_id}` not found")]
    TableNotFound { table_id: TableId },
    #[error("table `{table_id}` already initialized")]
    TableAlreadyExists { table_id: TableId },
    #[error("version {version} is no longer retained (oldest is {oldest})")]
    VersionNotRetained { version: u64, oldest: u64 },
    #[error("diff carries {operations} operations, limit is {max}; send a full snapshot instead")]
    DiffTooLarge { operations: usize, max: usize },
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
