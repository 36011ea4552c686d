use thiserror::Error;

/// Main error type for grantrag
#[derive(Error, Debug)]
pub enum GrantRagError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Drive collaborator errors (listing, download, export)
    #[error("Drive error: {0}")]
    Drive(String),

    /// Structured registry errors
    #[error("Registry error: {0}")]
    Registry(String),

    /// Vector store errors
    #[error("Vector store error: {0}")]
    Store(String),

    /// Text extraction errors
    #[error("Extraction error: {0}")]
    Extract(String),

    /// Segmentation errors
    #[error("Segmentation error: {0}")]
    Segment(String),

    /// LLM API errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenient Result type using GrantRagError
pub type Result<T> = std::result::Result<T, GrantRagError>;
