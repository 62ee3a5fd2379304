use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
