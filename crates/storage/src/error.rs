use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("checksum mismatch for slot: {key}")]
    ChecksumMismatch { key: String },
}
