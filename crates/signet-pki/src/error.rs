use thiserror::Error;

/// PKI core error type.
///
/// Two families: configuration-time failures (profile/issuer/bundle
/// validation, fatal at startup) and signing-time failures (returned
/// per request). Every variant carries the offending profile, field or
/// value so callers can surface actionable messages.
#[derive(Error, Debug)]
pub enum PkiError {
    /// Invalid profile or issuer configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The requested profile is not registered
    #[error("Unsupported profile: {0}")]
    UnsupportedProfile(String),

    /// The signing request (CSR or override fields) is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A name failed the profile's allow-list
    #[error("Name not allowed: {field}: {value}")]
    NameNotAllowed { field: &'static str, value: String },

    /// A requested extension OID is outside the profile's allow-list
    #[error("Extension not allowed: {0}")]
    ExtensionNotAllowed(String),

    /// Certificate chain could not be anchored to a trusted root
    #[error("Untrusted certificate chain: {0}")]
    UntrustedChain(String),

    /// Certificate policy declaration error
    #[error("Policy error: {0}")]
    PolicyError(String),

    /// CSR parse or signature failure
    #[error("CSR error: {0}")]
    CsrError(String),

    /// Certificate chain validation error
    #[error("Chain validation error: {0}")]
    ChainError(String),

    /// Serial number generation error
    #[error("Serial number error: {0}")]
    SerialError(String),

    /// Key provider error
    #[error("Key error: {0}")]
    KeyError(#[from] signet_key::KeyError),

    /// ASN.1 encode/decode error
    #[error("Encoding error: {0}")]
    EncodingError(#[from] der::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PkiError>;
