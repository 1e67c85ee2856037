use der::Decode;
use sha2::Sha256;
use signature::Verifier;
use spki::{DecodePublicKey, SubjectPublicKeyInfoOwned};

use crate::error::{KeyError, Result};

/// Verify a signature against a public key given as SPKI DER.
///
/// Dispatches on the SPKI algorithm OID, accepting the wire formats
/// produced by [`crate::Signer::sign`]. Returns `Ok(false)` for a
/// well-formed but non-matching signature; malformed inputs are
/// errors.
pub fn verify_with_spki(spki_der: &[u8], msg: &[u8], sig: &[u8]) -> Result<bool> {
    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der)
        .map_err(|e| KeyError::VerificationError(format!("invalid SPKI: {e}")))?;

    let oid = spki.algorithm.oid;
    if oid == const_oid::db::rfc8410::ID_ED_25519 {
        let key = ed25519_dalek::VerifyingKey::from_public_key_der(spki_der)
            .map_err(|e| KeyError::VerificationError(format!("invalid Ed25519 key: {e}")))?;
        let sig = ed25519_dalek::Signature::from_slice(sig)
            .map_err(|e| KeyError::VerificationError(format!("invalid signature: {e}")))?;
        Ok(key.verify(msg, &sig).is_ok())
    } else if oid == const_oid::db::rfc5912::ID_EC_PUBLIC_KEY {
        let key = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
            .map_err(|e| KeyError::VerificationError(format!("invalid P-256 key: {e}")))?;
        let sig = p256::ecdsa::Signature::from_der(sig)
            .map_err(|e| KeyError::VerificationError(format!("invalid signature: {e}")))?;
        Ok(key.verify(msg, &sig).is_ok())
    } else if oid == const_oid::db::rfc5912::RSA_ENCRYPTION {
        let key = rsa::RsaPublicKey::from_public_key_der(spki_der)
            .map_err(|e| KeyError::VerificationError(format!("invalid RSA key: {e}")))?;
        let key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key);
        let sig = rsa::pkcs1v15::Signature::try_from(sig)
            .map_err(|e| KeyError::VerificationError(format!("invalid signature: {e}")))?;
        Ok(key.verify(msg, &sig).is_ok())
    } else {
        Err(KeyError::UnsupportedAlgorithm(oid.to_string()))
    }
}
