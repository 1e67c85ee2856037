use thiserror::Error;

/// Error type for key provider operations
#[derive(Error, Debug)]
pub enum KeyError {
    /// Key generation failed
    #[error("Key generation error: {0}")]
    GenerationError(String),

    /// Signing failed
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Signature verification failed
    #[error("Signature verification error: {0}")]
    VerificationError(String),

    /// Key import failed
    #[error("Key import error: {0}")]
    ImportError(String),

    /// Key export failed
    #[error("Key export error: {0}")]
    ExportError(String),

    /// The requested key does not exist
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The key exists but is not exportable
    #[error("Key is not exportable: {0}")]
    NotExportable(String),

    /// Unsupported key algorithm
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// ASN.1 encode/decode error
    #[error("Encoding error: {0}")]
    EncodingError(#[from] der::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, KeyError>;
