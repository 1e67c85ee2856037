//! Request DTOs for ordinary signing and root issuance.

use serde::{Deserialize, Serialize};

/// One block of distinguished-name attributes
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct X509Name {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub organizational_unit: Option<String>,
}

impl X509Name {
    pub fn is_empty(&self) -> bool {
        self.country.is_none()
            && self.state.is_none()
            && self.locality.is_none()
            && self.organization.is_none()
            && self.organizational_unit.is_none()
    }
}

/// Certificate subject: common name plus attribute blocks
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct X509Subject {
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub names: Vec<X509Name>,
    #[serde(default)]
    pub serial_number: String,
}

impl X509Subject {
    /// Merge an override onto a base subject, field by field. Each
    /// unset override field falls back to the base value.
    pub fn merge_onto(&self, base: &X509Subject) -> X509Subject {
        X509Subject {
            common_name: if self.common_name.is_empty() {
                base.common_name.clone()
            } else {
                self.common_name.clone()
            },
            names: if self.names.is_empty() {
                base.names.clone()
            } else {
                self.names.clone()
            },
            serial_number: if self.serial_number.is_empty() {
                base.serial_number.clone()
            } else {
                self.serial_number.clone()
            },
        }
    }
}

/// Key parameters for root issuance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRequest {
    /// Algorithm name: `ed25519`, `ecdsa`, `rsa`
    pub algorithm: String,
    /// Bit size for RSA; ignored otherwise
    #[serde(default)]
    pub size: u32,
    /// Label for the generated key
    #[serde(default)]
    pub label: String,
}

impl Default for KeyRequest {
    fn default() -> Self {
        Self {
            algorithm: "ed25519".to_string(),
            size: 0,
            label: String::new(),
        }
    }
}

/// Structured request for root / self-signed issuance
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CertificateRequest {
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub names: Vec<X509Name>,
    /// SAN entries, classified by content during signing
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub key: KeyRequest,
}

/// Explicit extension attached by a signing request. The OID must be
/// allow-listed by the profile; the value is hex-encoded DER.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomExtension {
    pub oid: String,
    #[serde(default)]
    pub critical: bool,
    /// Hex-encoded extension value
    pub value: String,
}

/// A request to sign one certificate
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SignRequest {
    /// SAN override; when non-empty it replaces the CSR's SAN
    /// categories entirely
    #[serde(default)]
    pub hosts: Vec<String>,
    /// PEM-encoded PKCS#10 CSR
    pub csr: String,
    /// Optional subject override merged onto the CSR subject
    #[serde(default)]
    pub subject: Option<X509Subject>,
    /// Profile name; empty selects `default`
    #[serde(default)]
    pub profile: String,
    /// Explicit serial number bytes (big-endian, positive)
    #[serde(default)]
    pub serial: Option<Vec<u8>>,
    #[serde(default)]
    pub extensions: Vec<CustomExtension>,
    /// Explicit NotBefore as unix seconds
    #[serde(default)]
    pub not_before: Option<u64>,
    /// Explicit NotAfter as unix seconds
    #[serde(default)]
    pub not_after: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_merge_falls_back_per_field() {
        let base = X509Subject {
            common_name: "base.example.com".to_string(),
            names: vec![X509Name {
                organization: Some("Base Org".to_string()),
                ..Default::default()
            }],
            serial_number: "1234".to_string(),
        };
        let overlay = X509Subject {
            common_name: "override.example.com".to_string(),
            ..Default::default()
        };

        let merged = overlay.merge_onto(&base);
        assert_eq!(merged.common_name, "override.example.com");
        assert_eq!(merged.names, base.names);
        assert_eq!(merged.serial_number, "1234");
    }
}
