//! Common error types for WKMP

use thiserror::Error;

/// Common result type for WKMP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error kinds shared by every crate in the workspace.
///
/// The variants mirror the error-kind table: `NotFound`/`BadRequest` map to
/// 404/400 on the HTTP surface, `ResourceExhausted` to 503, `Transient`
/// failures are logged and skipped by the caller, and `Fatal` stops the
/// owning subsystem.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code this error should be reported as, per the error
    /// handling design.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::BadRequest(_) | Error::InvalidInput(_) => 400,
            Error::ResourceExhausted(_) => 503,
            Error::Transient(_) => 502,
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Fatal(_) | Error::Internal(_) => 500,
        }
    }
}
