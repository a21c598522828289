use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("invalid address: `{0}`")]
    InvalidAddress(String),
    #[error("json error: `{0}`")]
    Json(#[from] serde_json::Error),
}

impl From<hex::FromHexError> for Error {
    #[inline]
    fn from(e: hex::FromHexError) -> Self {
        Self::InvalidAddress(e.to_string())
    }
}
