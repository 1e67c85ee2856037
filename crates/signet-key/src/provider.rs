use std::sync::Arc;

use spki::AlgorithmIdentifierOwned;

use crate::{
    error::Result,
    types::{Algorithm, KeyExport, KeyHandle, KeyInfo},
};

/// A private key bound to a signing algorithm.
///
/// Implementations may hold raw key material (software backend) or a
/// session to an external device; callers only see the signing
/// capability, the public half, and the algorithm identifiers needed
/// to build X.509 structures around it.
pub trait Signer: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Public key as SPKI DER
    fn public_key_der(&self) -> Result<Vec<u8>>;

    /// AlgorithmIdentifier to place in `signatureAlgorithm` fields of
    /// certificates and CSRs signed by this key
    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned;

    /// Sign a message, producing the wire-format signature for this
    /// algorithm: raw 64 bytes for Ed25519, ASN.1 DER for ECDSA,
    /// PKCS#1 v1.5 for RSA. Hashing, where the scheme requires it,
    /// happens inside.
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>>;
}

/// Capability interface for key storage backends
pub trait KeyProvider: Send + Sync {
    /// Generate a fresh key under the given label
    fn generate_key(&self, label: &str, algorithm: Algorithm) -> Result<KeyHandle>;

    /// Identify a key by handle
    fn identify_key(&self, handle: KeyHandle) -> Result<KeyInfo>;

    /// Export key material by id. Backends holding non-exportable keys
    /// return a locator with no PEM.
    fn export_key(&self, id: &str) -> Result<KeyExport>;

    /// Load a signer from PKCS#8 PEM text or a provider locator URI
    fn load_signer(&self, pem_or_uri: &str) -> Result<Arc<dyn Signer>>;

    /// Obtain the signer for a generated key
    fn signer(&self, handle: KeyHandle) -> Result<Arc<dyn Signer>>;
}
