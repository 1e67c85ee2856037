use serde::{Deserialize, Serialize};

/// Signing algorithms supported by key providers
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    Ed25519,
    EcdsaP256,
    Rsa2048,
    Rsa4096,
}

impl Algorithm {
    /// Resolve an algorithm from its configured name plus a size/curve hint.
    ///
    /// `rsa` takes a bit size (2048 or 4096), `ecdsa` a curve name, and
    /// `ed25519` neither.
    pub fn from_request(algorithm: &str, size: u32) -> Option<Self> {
        match algorithm.to_ascii_lowercase().as_str() {
            "ed25519" => Some(Algorithm::Ed25519),
            "ecdsa" | "p256" | "ecdsa-p256" => Some(Algorithm::EcdsaP256),
            "rsa" => match size {
                0 | 2048 => Some(Algorithm::Rsa2048),
                4096 => Some(Algorithm::Rsa4096),
                _ => None,
            },
            _ => None,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Algorithm::Ed25519 => "ed25519",
            Algorithm::EcdsaP256 => "ecdsa-p256",
            Algorithm::Rsa2048 => "rsa-2048",
            Algorithm::Rsa4096 => "rsa-4096",
        };
        f.write_str(name)
    }
}

/// Opaque handle to a key held by a provider
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KeyHandle(pub u64);

/// Identity of a stored key
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Stable identifier derived from the public key
    pub id: String,
    /// Human-assigned label, if any
    pub label: Option<String>,
    pub algorithm: Algorithm,
}

/// Result of exporting a key from a provider.
///
/// Non-exportable keys (HSM-resident) carry only the locator URI.
#[derive(Clone, Debug)]
pub struct KeyExport {
    /// Provider-specific locator for the key material
    pub locator: String,
    /// PKCS#8 PEM, present only when the backend allows raw export
    pub pem: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_from_request() {
        assert_eq!(
            Algorithm::from_request("ed25519", 0),
            Some(Algorithm::Ed25519)
        );
        assert_eq!(
            Algorithm::from_request("ECDSA", 0),
            Some(Algorithm::EcdsaP256)
        );
        assert_eq!(Algorithm::from_request("rsa", 0), Some(Algorithm::Rsa2048));
        assert_eq!(
            Algorithm::from_request("rsa", 4096),
            Some(Algorithm::Rsa4096)
        );
        assert_eq!(Algorithm::from_request("rsa", 1024), None);
        assert_eq!(Algorithm::from_request("dsa", 0), None);
    }
}
