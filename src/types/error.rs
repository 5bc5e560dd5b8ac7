use thiserror::Error;

/// playtrack error types
#[derive(Error, Debug)]
pub enum PlaytrackError {
    /// Upstream request failed (transport error or non-200 status)
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Snapshot could not be persisted
    #[error("persistence write error: {0}")]
    PersistenceWrite(String),

    /// Snapshot file could not be read
    #[error("persistence read error: {0}")]
    PersistenceRead(String),

    /// Failed to parse JSON/TOML
    #[error("parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for playtrack
pub type Result<T> = std::result::Result<T, PlaytrackError>;
