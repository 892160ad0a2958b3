//! Error types for abrbench

use thiserror::Error;

/// Result type alias using abrbench Error
pub type Result<T> = std::result::Result<T, Error>;

/// abrbench common error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("\"{0}\" not found. Use \"list\" to see all tests.")]
    UnknownTestName(String),

    #[error("Duplicate test name in catalog: {0}")]
    DuplicateTestName(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
