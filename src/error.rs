use thiserror::Error;

/// Type alias for Result with ExportError
pub type Result<T> = std::result::Result<T, ExportError>;

/// Error types for the email export pipelines
#[derive(Error, Debug)]
pub enum ExportError {
    /// Required setting missing or left at its placeholder default
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential rejected, or the OAuth2 flow failed or timed out
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure (TCP, TLS, DNS) before or during a session
    #[error("Connection error: {0}")]
    Connect(String),

    /// Requested mail folder does not exist
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// A page or individual message could not be retrieved
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A single record's fields could not be parsed or decoded
    #[error("Could not normalize record: {0}")]
    Normalize(String),

    /// Output file could not be written
    #[error("Failed to write output file: {0}")]
    Persistence(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExportError {
    /// Whether this error aborts the run.
    ///
    /// Fetch and Normalize errors are handled at their call sites (stop
    /// pagination / skip the record) and never terminate an export; the
    /// rest do.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ExportError::Fetch(_) | ExportError::Normalize(_))
    }
}

impl From<reqwest::Error> for ExportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            ExportError::Connect(error.to_string())
        } else {
            ExportError::Fetch(error.to_string())
        }
    }
}
