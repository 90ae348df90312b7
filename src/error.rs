use thiserror::Error;

/// Library error type for photocast operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured photo library root is missing or not a directory.
    #[error("invalid photo library root: {0}")]
    BadRoot(String),

    /// The library walk could not start.
    #[error("photo library walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}
