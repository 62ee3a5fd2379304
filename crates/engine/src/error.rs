use condfmt_core::{CoreError, SessionId};
use condfmt_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session already completed: {0}")]
    SessionSealed(SessionId),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid import: {0}")]
    InvalidImport(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Encode(e.to_string())
    }
}
