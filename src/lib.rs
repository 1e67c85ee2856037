//! # Signet
//!
//! Private certificate authority engine.
//!
//! ## Crates
//!
//! - `signet_key` - key provider boundary (software backend, signer handles)
//! - `signet_pki` - the CA core: authority registry, issuers, profiles, signing

// Re-export all sub-crates
pub use signet_key;
pub use signet_pki;
