use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};
use signature::{SignatureEncoding, Signer as _};
use spki::{AlgorithmIdentifierOwned, EncodePublicKey};

use crate::{
    error::{KeyError, Result},
    provider::{KeyProvider, Signer},
    types::{Algorithm, KeyExport, KeyHandle, KeyInfo},
};

/// Locator scheme for keys held in this provider
const LOCATOR_SCHEME: &str = "mem://";

/// In-memory software key, one variant per supported algorithm
enum SoftwareKey {
    Ed25519(ed25519_dalek::SigningKey),
    P256(p256::ecdsa::SigningKey),
    Rsa(Box<rsa::RsaPrivateKey>, Algorithm),
}

/// A software signer: raw key material plus its resolved algorithm
pub struct SoftwareSigner {
    key: SoftwareKey,
}

impl SoftwareSigner {
    fn generate(algorithm: Algorithm) -> Result<Self> {
        let key = match algorithm {
            Algorithm::Ed25519 => {
                SoftwareKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng))
            }
            Algorithm::EcdsaP256 => SoftwareKey::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            Algorithm::Rsa2048 => {
                let key = rsa::RsaPrivateKey::new(&mut OsRng, 2048)
                    .map_err(|e| KeyError::GenerationError(format!("RSA keygen failed: {e}")))?;
                SoftwareKey::Rsa(Box::new(key), algorithm)
            }
            Algorithm::Rsa4096 => {
                let key = rsa::RsaPrivateKey::new(&mut OsRng, 4096)
                    .map_err(|e| KeyError::GenerationError(format!("RSA keygen failed: {e}")))?;
                SoftwareKey::Rsa(Box::new(key), algorithm)
            }
        };
        Ok(Self { key })
    }

    /// Load from PKCS#8 PEM, trying each supported algorithm in turn
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self {
                key: SoftwareKey::Ed25519(key),
            });
        }
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self {
                key: SoftwareKey::P256(key),
            });
        }
        if let Ok(key) = rsa::RsaPrivateKey::from_pkcs8_pem(pem) {
            let algorithm = if key.size() * 8 >= 4096 {
                Algorithm::Rsa4096
            } else {
                Algorithm::Rsa2048
            };
            return Ok(Self {
                key: SoftwareKey::Rsa(Box::new(key), algorithm),
            });
        }
        Err(KeyError::ImportError(
            "not a PKCS#8 Ed25519, ECDSA P-256 or RSA private key".to_string(),
        ))
    }

    /// Export private key material as PKCS#8 PEM
    fn to_pkcs8_pem(&self) -> Result<String> {
        let pem = match &self.key {
            SoftwareKey::Ed25519(key) => key.to_pkcs8_pem(LineEnding::LF),
            SoftwareKey::P256(key) => key.to_pkcs8_pem(LineEnding::LF),
            SoftwareKey::Rsa(key, _) => key.to_pkcs8_pem(LineEnding::LF),
        }
        .map_err(|e| KeyError::ExportError(format!("PKCS#8 export failed: {e}")))?;
        Ok(pem.to_string())
    }
}

impl Signer for SoftwareSigner {
    fn algorithm(&self) -> Algorithm {
        match &self.key {
            SoftwareKey::Ed25519(_) => Algorithm::Ed25519,
            SoftwareKey::P256(_) => Algorithm::EcdsaP256,
            SoftwareKey::Rsa(_, algorithm) => *algorithm,
        }
    }

    fn public_key_der(&self) -> Result<Vec<u8>> {
        let doc = match &self.key {
            SoftwareKey::Ed25519(key) => key.verifying_key().to_public_key_der(),
            SoftwareKey::P256(key) => key.verifying_key().to_public_key_der(),
            SoftwareKey::Rsa(key, _) => key.to_public_key().to_public_key_der(),
        }
        .map_err(|e| KeyError::ExportError(format!("SPKI export failed: {e}")))?;
        Ok(doc.as_bytes().to_vec())
    }

    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        match &self.key {
            SoftwareKey::Ed25519(_) => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc8410::ID_ED_25519,
                parameters: None,
            },
            SoftwareKey::P256(_) => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            // RSASSA-PKCS1-v1.5 requires explicit NULL parameters
            SoftwareKey::Rsa(_, _) => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(der::Any::null()),
            },
        }
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        match &self.key {
            SoftwareKey::Ed25519(key) => {
                let sig: ed25519_dalek::Signature = key
                    .try_sign(msg)
                    .map_err(|e| KeyError::SigningError(format!("Ed25519 sign failed: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }
            SoftwareKey::P256(key) => {
                let sig: p256::ecdsa::Signature = key
                    .try_sign(msg)
                    .map_err(|e| KeyError::SigningError(format!("ECDSA sign failed: {e}")))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            SoftwareKey::Rsa(key, _) => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new((**key).clone());
                let sig = signing_key
                    .try_sign(msg)
                    .map_err(|e| KeyError::SigningError(format!("RSA sign failed: {e}")))?;
                Ok(sig.to_vec())
            }
        }
    }
}

struct StoredKey {
    signer: Arc<SoftwareSigner>,
    info: KeyInfo,
}

/// Software key provider holding exportable keys in memory.
///
/// Intended for tests and software-only deployments; an HSM-backed
/// provider implements the same `KeyProvider` trait against a device
/// session instead.
pub struct SoftwareProvider {
    keys: RwLock<HashMap<u64, StoredKey>>,
    next_handle: AtomicU64,
}

impl SoftwareProvider {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Stable key id: leading bytes of SHA-256 over the SPKI DER
    fn key_id(spki_der: &[u8]) -> String {
        let digest = Sha256::digest(spki_der);
        hex::encode(&digest[..8])
    }
}

impl Default for SoftwareProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvider for SoftwareProvider {
    fn generate_key(&self, label: &str, algorithm: Algorithm) -> Result<KeyHandle> {
        let signer = SoftwareSigner::generate(algorithm)?;
        let id = Self::key_id(&signer.public_key_der()?);
        let handle = KeyHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));

        tracing::debug!(%algorithm, label, id, "generated software key");

        let info = KeyInfo {
            id,
            label: Some(label.to_string()),
            algorithm,
        };
        self.keys
            .write()
            .expect("key map lock poisoned")
            .insert(handle.0, StoredKey {
                signer: Arc::new(signer),
                info,
            });
        Ok(handle)
    }

    fn identify_key(&self, handle: KeyHandle) -> Result<KeyInfo> {
        let keys = self.keys.read().expect("key map lock poisoned");
        keys.get(&handle.0)
            .map(|stored| stored.info.clone())
            .ok_or_else(|| KeyError::KeyNotFound(format!("handle {}", handle.0)))
    }

    fn export_key(&self, id: &str) -> Result<KeyExport> {
        let keys = self.keys.read().expect("key map lock poisoned");
        let stored = keys
            .values()
            .find(|stored| stored.info.id == id)
            .ok_or_else(|| KeyError::KeyNotFound(id.to_string()))?;
        Ok(KeyExport {
            locator: format!("{LOCATOR_SCHEME}{id}"),
            pem: Some(stored.signer.to_pkcs8_pem()?),
        })
    }

    fn load_signer(&self, pem_or_uri: &str) -> Result<Arc<dyn Signer>> {
        if let Some(id) = pem_or_uri.strip_prefix(LOCATOR_SCHEME) {
            let keys = self.keys.read().expect("key map lock poisoned");
            let stored = keys
                .values()
                .find(|stored| stored.info.id == id)
                .ok_or_else(|| KeyError::KeyNotFound(id.to_string()))?;
            return Ok(stored.signer.clone());
        }
        Ok(Arc::new(SoftwareSigner::from_pkcs8_pem(pem_or_uri)?))
    }

    fn signer(&self, handle: KeyHandle) -> Result<Arc<dyn Signer>> {
        let keys = self.keys.read().expect("key map lock poisoned");
        keys.get(&handle.0)
            .map(|stored| stored.signer.clone() as Arc<dyn Signer>)
            .ok_or_else(|| KeyError::KeyNotFound(format!("handle {}", handle.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::verify_with_spki;

    #[test]
    fn test_generate_and_sign_ed25519() {
        let provider = SoftwareProvider::new();
        let handle = provider.generate_key("test", Algorithm::Ed25519).unwrap();
        let signer = provider.signer(handle).unwrap();

        let msg = b"the quick brown fox";
        let sig = signer.sign(msg).unwrap();
        assert_eq!(sig.len(), 64);

        let spki = signer.public_key_der().unwrap();
        assert!(verify_with_spki(&spki, msg, &sig).unwrap());
        assert!(!verify_with_spki(&spki, b"tampered", &sig).unwrap());
    }

    #[test]
    fn test_generate_and_sign_p256() {
        let provider = SoftwareProvider::new();
        let handle = provider.generate_key("test", Algorithm::EcdsaP256).unwrap();
        let signer = provider.signer(handle).unwrap();

        let msg = b"ecdsa message";
        let sig = signer.sign(msg).unwrap();
        let spki = signer.public_key_der().unwrap();
        assert!(verify_with_spki(&spki, msg, &sig).unwrap());
        assert!(!verify_with_spki(&spki, b"other", &sig).unwrap());
    }

    #[test]
    fn test_identify_and_export() {
        let provider = SoftwareProvider::new();
        let handle = provider
            .generate_key("issuer-key", Algorithm::Ed25519)
            .unwrap();

        let info = provider.identify_key(handle).unwrap();
        assert_eq!(info.label.as_deref(), Some("issuer-key"));
        assert_eq!(info.algorithm, Algorithm::Ed25519);

        let export = provider.export_key(&info.id).unwrap();
        assert!(export.locator.starts_with(LOCATOR_SCHEME));
        let pem = export.pem.unwrap();
        assert!(pem.contains("PRIVATE KEY"));

        // The exported PEM must load back to a working signer
        let signer = provider.load_signer(&pem).unwrap();
        let sig = signer.sign(b"roundtrip").unwrap();
        let spki = signer.public_key_der().unwrap();
        assert!(verify_with_spki(&spki, b"roundtrip", &sig).unwrap());
    }

    #[test]
    fn test_rsa_export_reimports_with_modulus_size() {
        let provider = SoftwareProvider::new();
        let handle = provider.generate_key("rsa", Algorithm::Rsa2048).unwrap();
        let info = provider.identify_key(handle).unwrap();

        let pem = provider.export_key(&info.id).unwrap().pem.unwrap();
        let signer = SoftwareSigner::from_pkcs8_pem(&pem).unwrap();
        assert_eq!(signer.algorithm(), Algorithm::Rsa2048);

        let sig = signer.sign(b"rsa roundtrip").unwrap();
        let spki = signer.public_key_der().unwrap();
        assert!(verify_with_spki(&spki, b"rsa roundtrip", &sig).unwrap());
    }

    #[test]
    fn test_load_signer_by_locator() {
        let provider = SoftwareProvider::new();
        let handle = provider.generate_key("loc", Algorithm::Ed25519).unwrap();
        let info = provider.identify_key(handle).unwrap();

        let signer = provider
            .load_signer(&format!("{LOCATOR_SCHEME}{}", info.id))
            .unwrap();
        assert_eq!(signer.algorithm(), Algorithm::Ed25519);
    }

    #[test]
    fn test_unknown_handle() {
        let provider = SoftwareProvider::new();
        assert!(matches!(
            provider.identify_key(KeyHandle(99)),
            Err(KeyError::KeyNotFound(_))
        ));
    }
}
