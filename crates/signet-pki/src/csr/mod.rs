//! Certificate Signing Request handling.
//!
//! Parsing, self-signature verification and construction of PKCS#10
//! requests. Construction is only used by the root/self-sign flow; the
//! ordinary signing path consumes CSRs produced by clients.

use der::{asn1::SetOfVec, Decode, Encode};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::{
    attr::Attribute,
    ext::{pkix::name::GeneralName, pkix::SubjectAltName, Extension, Extensions},
    request::{CertReq, CertReqInfo, Version},
};

use signet_key::Signer;

use crate::{
    cert::{self, SanEntry, Template, X509Subject},
    error::{PkiError, Result},
    extensions::{self, oids},
};

/// A parsed PKCS#10 certificate signing request
#[derive(Debug, Clone)]
pub struct Csr {
    inner: CertReq,
}

/// Create a signed CSR for a freshly generated key (root flow).
///
/// Builds the unsigned request info, signs it with the provided key
/// and assembles the final structure.
pub fn create_csr(signer: &dyn Signer, subject: &X509Subject, hosts: &[String]) -> Result<Csr> {
    let spki_der = signer.public_key_der()?;
    let info = build_unsigned(subject, hosts, &spki_der)?;

    let info_der = info
        .to_der()
        .map_err(|e| PkiError::CsrError(format!("failed to encode CertReqInfo: {e}")))?;
    let signature = signer.sign(&info_der)?;

    Csr::assemble(info, signer, &signature)
}

/// Build the unsigned portion of a CSR
pub fn build_unsigned(
    subject: &X509Subject,
    hosts: &[String],
    spki_der: &[u8],
) -> Result<CertReqInfo> {
    let subject_dn = cert::build_name(subject)?;

    let public_key = SubjectPublicKeyInfoOwned::from_der(spki_der)
        .map_err(|e| PkiError::CsrError(format!("failed to parse SPKI: {e}")))?;

    let mut attributes = SetOfVec::new();
    if !hosts.is_empty() {
        let mut dns = Vec::new();
        let mut ips = Vec::new();
        let mut emails = Vec::new();
        let mut uris = Vec::new();
        for host in hosts {
            match cert::classify_san(host) {
                SanEntry::Dns(name) => dns.push(name),
                SanEntry::Ip(ip) => ips.push(ip),
                SanEntry::Email(email) => emails.push(email),
                SanEntry::Uri(uri) => uris.push(uri),
            }
        }
        let san = extensions::subject_alt_name(&dns, &ips, &emails, &uris, false)?;
        let extensions: Extensions = vec![san];

        let mut values = SetOfVec::new();
        values
            .insert(der::Any::encode_from(&extensions)?)
            .map_err(|e| PkiError::CsrError(format!("failed to build extensionRequest: {e}")))?;
        attributes
            .insert(Attribute {
                oid: oids::EXTENSION_REQUEST,
                values,
            })
            .map_err(|e| PkiError::CsrError(format!("failed to add extensionRequest: {e}")))?;
    }

    Ok(CertReqInfo {
        version: Version::V1,
        subject: subject_dn,
        public_key,
        attributes,
    })
}

impl Csr {
    /// Assemble a complete CSR from its unsigned info and a signature
    /// produced by the given signer
    pub fn assemble(info: CertReqInfo, signer: &dyn Signer, signature: &[u8]) -> Result<Self> {
        let inner = CertReq {
            info,
            algorithm: signer.signature_algorithm(),
            signature: der::asn1::BitString::from_bytes(signature)
                .map_err(|e| PkiError::CsrError(format!("failed to wrap signature: {e}")))?,
        };
        Ok(Self { inner })
    }

    /// Parse CSR from PEM format
    pub fn from_pem(pem_text: &str) -> Result<Self> {
        let block = pem::parse(pem_text)
            .map_err(|e| PkiError::CsrError(format!("failed to parse PEM: {e}")))?;

        if block.tag() != "CERTIFICATE REQUEST" && block.tag() != "NEW CERTIFICATE REQUEST" {
            return Err(PkiError::CsrError(
                "invalid PEM tag, expected CERTIFICATE REQUEST".to_string(),
            ));
        }

        Self::from_der(block.contents())
    }

    /// Parse CSR from DER format
    pub fn from_der(der_bytes: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der_bytes)
            .map_err(|e| PkiError::CsrError(format!("failed to parse DER: {e}")))?;
        Ok(Self { inner })
    }

    /// Export CSR to PEM format
    pub fn to_pem(&self) -> Result<String> {
        let der_bytes = self.to_der()?;
        Ok(pem::encode(&pem::Pem::new("CERTIFICATE REQUEST", der_bytes)))
    }

    /// Export CSR to DER format
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| PkiError::CsrError(format!("failed to encode DER: {e}")))
    }

    /// Save CSR to a PEM file
    pub fn save_pem_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let pem = self.to_pem()?;
        std::fs::write(path, pem).map_err(PkiError::IoError)
    }

    /// Load CSR from a PEM file
    pub fn load_pem_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let pem = std::fs::read_to_string(path).map_err(PkiError::IoError)?;
        Self::from_pem(&pem)
    }

    /// The request's subject in structured form
    pub fn subject(&self) -> X509Subject {
        cert::parse_name(&self.inner.info.subject)
    }

    /// The embedded public key
    pub fn public_key(&self) -> &SubjectPublicKeyInfoOwned {
        &self.inner.info.public_key
    }

    /// Verify the embedded self-signature against the embedded public
    /// key. Supported algorithms follow the key provider: Ed25519,
    /// ECDSA P-256, RSA PKCS#1 v1.5.
    pub fn verify_signature(&self) -> Result<()> {
        let info_der = self
            .inner
            .info
            .to_der()
            .map_err(|e| PkiError::CsrError(format!("failed to encode info: {e}")))?;

        let spki_der = self
            .inner
            .info
            .public_key
            .to_der()
            .map_err(|e| PkiError::CsrError(format!("failed to encode SPKI: {e}")))?;

        let valid =
            signet_key::verify_with_spki(&spki_der, &info_der, self.inner.signature.raw_bytes())
                .map_err(|e| PkiError::CsrError(format!("signature check failed: {e}")))?;
        if !valid {
            return Err(PkiError::CsrError(
                "CSR signature verification failed".to_string(),
            ));
        }
        Ok(())
    }

    /// SAN entries requested via the PKCS#9 extensionRequest attribute
    pub fn requested_sans(&self) -> Result<Vec<SanEntry>> {
        let mut sans = Vec::new();
        for attribute in self.inner.info.attributes.iter() {
            if attribute.oid != oids::EXTENSION_REQUEST {
                continue;
            }
            for value in attribute.values.iter() {
                let extensions: Extensions = value.decode_as().map_err(|e| {
                    PkiError::CsrError(format!("malformed extensionRequest: {e}"))
                })?;
                for extension in &extensions {
                    sans.extend(parse_san_extension(extension)?);
                }
            }
        }
        Ok(sans)
    }

    /// Build the certificate template implied by this CSR: subject,
    /// public key, declared signature algorithm and requested SANs.
    /// The caller must have verified the signature first.
    pub fn to_template(&self) -> Result<Template> {
        let mut template = Template::new(
            self.inner.info.public_key.clone(),
            self.inner.algorithm.clone(),
        );
        template.subject = self.subject();
        for san in self.requested_sans()? {
            match san {
                SanEntry::Dns(name) => template.dns_names.push(name),
                SanEntry::Ip(ip) => template.ip_addresses.push(ip),
                SanEntry::Email(email) => template.email_addresses.push(email),
                SanEntry::Uri(uri) => template.uris.push(uri),
            }
        }
        Ok(template)
    }
}

fn parse_san_extension(extension: &Extension) -> Result<Vec<SanEntry>> {
    if extension.extn_id != oids::ID_CE_SUBJECT_ALT_NAME {
        return Ok(Vec::new());
    }
    let san = SubjectAltName::from_der(extension.extn_value.as_bytes())
        .map_err(|e| PkiError::CsrError(format!("malformed SubjectAltName: {e}")))?;

    let mut entries = Vec::new();
    for name in san.0 {
        match name {
            GeneralName::DnsName(dns) => entries.push(SanEntry::Dns(dns.to_string())),
            GeneralName::Rfc822Name(email) => entries.push(SanEntry::Email(email.to_string())),
            GeneralName::UniformResourceIdentifier(uri) => {
                entries.push(SanEntry::Uri(uri.to_string()))
            }
            GeneralName::IpAddress(octets) => {
                let entry = match octets.as_bytes().len() {
                    4 => {
                        let mut bytes = [0u8; 4];
                        bytes.copy_from_slice(octets.as_bytes());
                        SanEntry::Ip(std::net::IpAddr::from(bytes))
                    }
                    16 => {
                        let mut bytes = [0u8; 16];
                        bytes.copy_from_slice(octets.as_bytes());
                        SanEntry::Ip(std::net::IpAddr::from(bytes))
                    }
                    len => {
                        return Err(PkiError::CsrError(format!(
                            "invalid IP address length in SAN: {len}"
                        )))
                    }
                };
                entries.push(entry);
            }
            // other general name forms are not carried by this CA
            _ => {}
        }
    }
    Ok(entries)
}
