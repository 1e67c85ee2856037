//! Certificate bundles: a leaf chained through zero or more
//! intermediates to a trust anchor.
//!
//! Verification reports problems through [`BundleStatus`] instead of
//! failing outright; only a chain that cannot be anchored is treated
//! as a hard error by callers constructing issuers.

use der::{Decode, Encode};
use sha1::{Digest, Sha1};
use x509_cert::{ext::pkix::name::GeneralName, ext::pkix::SubjectAltName, Certificate};

use crate::{
    cert::name_to_string,
    error::{PkiError, Result},
    extensions::oids,
};

/// Window before expiry that triggers a warning issue
const EXPIRY_WARNING_SECS: i64 = 30 * 24 * 3600;

/// Problem severity within a bundle status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueLevel {
    Warning,
    Error,
}

/// One problem detected during bundle verification
#[derive(Clone, Debug)]
pub struct BundleIssue {
    pub level: IssueLevel,
    pub message: String,
}

/// Non-fatal verification report attached to a bundle
#[derive(Clone, Debug, Default)]
pub struct BundleStatus {
    pub issues: Vec<BundleIssue>,
    /// Subject ids of chain certificates about to expire
    pub expiring_ids: Vec<String>,
    /// Set when the chain could not be anchored to a trusted root
    pub untrusted: bool,
}

impl BundleStatus {
    fn warn(&mut self, message: String) {
        self.issues.push(BundleIssue {
            level: IssueLevel::Warning,
            message,
        });
    }

    fn error(&mut self, message: String) {
        self.issues.push(BundleIssue {
            level: IssueLevel::Error,
            message,
        });
    }
}

/// A verified certificate chain plus derived metadata. Immutable once
/// built.
#[derive(Clone, Debug)]
pub struct Bundle {
    /// Leaf first, trust anchor last
    chain: Vec<Certificate>,
    subject_dn: String,
    issuer_dn: String,
    subject_id: String,
    issuer_id: String,
    /// Earliest NotAfter across the chain, unix seconds
    expiry: u64,
    hostnames: Vec<String>,
    leaf_pem: String,
    intermediates_pem: String,
    root_pem: String,
    status: BundleStatus,
}

impl Bundle {
    /// Build and verify a bundle from PEM material. `intermediates`
    /// and `roots` may be empty; a self-signed leaf with no roots
    /// verifies as its own anchor (the root/self-sign flow).
    pub fn from_pem(
        leaf_pem: &str,
        intermediates_pem: Option<&str>,
        roots_pem: Option<&str>,
    ) -> Result<Bundle> {
        let leaf = parse_single_pem(leaf_pem)?;
        let intermediates = match intermediates_pem {
            Some(pem_text) => parse_many_pem(pem_text)?,
            None => Vec::new(),
        };
        let roots = match roots_pem {
            Some(pem_text) => parse_many_pem(pem_text)?,
            None => Vec::new(),
        };
        Self::build(leaf, intermediates, roots)
    }

    fn build(
        leaf: Certificate,
        intermediates: Vec<Certificate>,
        roots: Vec<Certificate>,
    ) -> Result<Bundle> {
        let mut status = BundleStatus::default();
        let mut chain = vec![leaf.clone()];

        // walk up: leaf -> intermediates -> root; the visited set stops
        // the walk when cross-signed certificates form a loop
        let mut current = leaf.clone();
        let mut visited = vec![leaf.tbs_certificate.subject.to_der()?];
        loop {
            if is_self_signed(&current)? {
                break;
            }
            let issuer_der = current.tbs_certificate.issuer.to_der()?;
            let parent = intermediates
                .iter()
                .chain(roots.iter())
                .find(|candidate| {
                    candidate
                        .tbs_certificate
                        .subject
                        .to_der()
                        .map(|der| der == issuer_der)
                        .unwrap_or(false)
                })
                .cloned();

            match parent {
                Some(parent) => {
                    if !verify_issued_by(&current, &parent)? {
                        status.error(format!(
                            "signature of {} does not verify against {}",
                            name_to_string(&current.tbs_certificate.subject),
                            name_to_string(&parent.tbs_certificate.subject),
                        ));
                        status.untrusted = true;
                        break;
                    }
                    let parent_subject = parent.tbs_certificate.subject.to_der()?;
                    if visited.contains(&parent_subject) {
                        status.error(format!(
                            "certificate chain loops back through {}",
                            name_to_string(&parent.tbs_certificate.subject)
                        ));
                        status.untrusted = true;
                        break;
                    }
                    visited.push(parent_subject);
                    chain.push(parent.clone());
                    current = parent;
                }
                None => {
                    status.error(format!(
                        "no issuer certificate found for {}",
                        name_to_string(&current.tbs_certificate.subject)
                    ));
                    status.untrusted = true;
                    break;
                }
            }
        }

        // the walk ended on a self-signed certificate: trusted when it
        // is a declared root, or when there are no roots at all and the
        // leaf anchors itself
        if !status.untrusted {
            let anchor = chain.last().expect("chain never empty");
            if roots.is_empty() {
                if chain.len() > 1 {
                    status.untrusted = true;
                    status.error("chain ends without a configured trust anchor".to_string());
                } else if !verify_issued_by(anchor, anchor)? {
                    status.untrusted = true;
                    status.error("self-signed certificate fails its own signature".to_string());
                }
            } else {
                let anchor_der = anchor.to_der()?;
                let trusted = roots
                    .iter()
                    .map(|root| root.to_der())
                    .collect::<der::Result<Vec<_>>>()?
                    .iter()
                    .any(|der| *der == anchor_der);
                if !trusted {
                    status.untrusted = true;
                    status.error(format!(
                        "chain anchor {} is not in the root bundle",
                        name_to_string(&anchor.tbs_certificate.subject)
                    ));
                } else if !verify_issued_by(anchor, anchor)? {
                    status.untrusted = true;
                    status.error("root certificate fails its own signature".to_string());
                }
            }
        }

        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let mut expiry = u64::MAX;
        for certificate in &chain {
            let not_after = time_to_unix(&certificate.tbs_certificate.validity.not_after);
            expiry = expiry.min(not_after);
            let id = subject_id_of(certificate)?;
            if (not_after as i64) < now {
                status.error(format!("certificate {id} has expired"));
            } else if (not_after as i64) - now < EXPIRY_WARNING_SECS {
                status.warn(format!("certificate {id} expires soon"));
                status.expiring_ids.push(id);
            }
        }

        let subject_id = subject_id_of(&leaf)?;
        let issuer = chain.get(1).unwrap_or(&leaf);
        let issuer_id = subject_id_of(issuer)?;

        let intermediates_pem = if chain.len() > 2 {
            chain[1..chain.len() - 1]
                .iter()
                .map(cert_to_pem)
                .collect::<Result<Vec<_>>>()?
                .join("")
        } else {
            String::new()
        };
        let root_pem = if chain.len() > 1 {
            cert_to_pem(chain.last().expect("chain never empty"))?
        } else {
            String::new()
        };

        Ok(Bundle {
            subject_dn: name_to_string(&leaf.tbs_certificate.subject),
            issuer_dn: name_to_string(&leaf.tbs_certificate.issuer),
            subject_id,
            issuer_id,
            expiry,
            hostnames: hostnames_of(&leaf)?,
            leaf_pem: cert_to_pem(&leaf)?,
            intermediates_pem,
            root_pem,
            chain,
            status,
        })
    }

    pub fn leaf(&self) -> &Certificate {
        &self.chain[0]
    }

    /// The certificate that signed the leaf (the leaf itself when
    /// self-signed)
    pub fn issuer_cert(&self) -> &Certificate {
        self.chain.get(1).unwrap_or(&self.chain[0])
    }

    pub fn root_cert(&self) -> &Certificate {
        self.chain.last().expect("chain never empty")
    }

    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    pub fn subject_dn(&self) -> &str {
        &self.subject_dn
    }

    pub fn issuer_dn(&self) -> &str {
        &self.issuer_dn
    }

    /// Leaf subject id: hex SKI, falling back to a digest of the DER
    /// subject name
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn issuer_id(&self) -> &str {
        &self.issuer_id
    }

    /// Earliest NotAfter across the chain, unix seconds
    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    pub fn leaf_pem(&self) -> &str {
        &self.leaf_pem
    }

    pub fn intermediates_pem(&self) -> &str {
        &self.intermediates_pem
    }

    pub fn root_pem(&self) -> &str {
        &self.root_pem
    }

    pub fn status(&self) -> &BundleStatus {
        &self.status
    }

    pub fn is_untrusted(&self) -> bool {
        self.status.untrusted
    }
}

/// `child` carries a signature made by `parent`'s key
fn verify_issued_by(child: &Certificate, parent: &Certificate) -> Result<bool> {
    let spki_der = parent
        .tbs_certificate
        .subject_public_key_info
        .to_der()?;
    let tbs_der = child.tbs_certificate.to_der()?;
    signet_key::verify_with_spki(&spki_der, &tbs_der, child.signature.raw_bytes())
        .map_err(|e| PkiError::ChainError(format!("signature verification failed: {e}")))
}

fn is_self_signed(certificate: &Certificate) -> Result<bool> {
    Ok(certificate.tbs_certificate.subject.to_der()?
        == certificate.tbs_certificate.issuer.to_der()?)
}

/// Subject id: hex of the SubjectKeyIdentifier extension, or SHA-1 of
/// the DER subject name when the certificate carries no SKI
pub fn subject_id_of(certificate: &Certificate) -> Result<String> {
    if let Some(extensions) = &certificate.tbs_certificate.extensions {
        for extension in extensions {
            if extension.extn_id == oids::ID_CE_SUBJECT_KEY_IDENTIFIER {
                let ski = der::asn1::OctetString::from_der(extension.extn_value.as_bytes())?;
                return Ok(hex::encode(ski.as_bytes()));
            }
        }
    }
    let name_der = certificate.tbs_certificate.subject.to_der()?;
    Ok(hex::encode(Sha1::digest(&name_der)))
}

fn hostnames_of(certificate: &Certificate) -> Result<Vec<String>> {
    let mut hostnames = Vec::new();
    if let Some(extensions) = &certificate.tbs_certificate.extensions {
        for extension in extensions {
            if extension.extn_id == oids::ID_CE_SUBJECT_ALT_NAME {
                let san = SubjectAltName::from_der(extension.extn_value.as_bytes())?;
                for name in san.0 {
                    if let GeneralName::DnsName(dns) = name {
                        hostnames.push(dns.to_string());
                    }
                }
            }
        }
    }
    let subject = crate::cert::parse_name(&certificate.tbs_certificate.subject);
    if !subject.common_name.is_empty() && !hostnames.contains(&subject.common_name) {
        hostnames.push(subject.common_name);
    }
    Ok(hostnames)
}

pub(crate) fn time_to_unix(value: &x509_cert::time::Time) -> u64 {
    match value {
        x509_cert::time::Time::UtcTime(utc) => utc.to_unix_duration().as_secs(),
        x509_cert::time::Time::GeneralTime(general) => general.to_unix_duration().as_secs(),
    }
}

pub(crate) fn cert_to_pem(certificate: &Certificate) -> Result<String> {
    let der_bytes = certificate.to_der()?;
    Ok(pem::encode(&pem::Pem::new("CERTIFICATE", der_bytes)))
}

pub(crate) fn parse_single_pem(pem_text: &str) -> Result<Certificate> {
    let block =
        pem::parse(pem_text).map_err(|e| PkiError::ChainError(format!("invalid PEM: {e}")))?;
    if block.tag() != "CERTIFICATE" {
        return Err(PkiError::ChainError(format!(
            "expected CERTIFICATE block, found {}",
            block.tag()
        )));
    }
    Certificate::from_der(block.contents())
        .map_err(|e| PkiError::ChainError(format!("invalid certificate DER: {e}")))
}

pub(crate) fn parse_many_pem(pem_text: &str) -> Result<Vec<Certificate>> {
    let blocks = pem::parse_many(pem_text)
        .map_err(|e| PkiError::ChainError(format!("invalid PEM bundle: {e}")))?;
    blocks
        .iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| {
            Certificate::from_der(block.contents())
                .map_err(|e| PkiError::ChainError(format!("invalid certificate DER: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use signet_key::{Algorithm, KeyProvider, Signer, SoftwareProvider};

    use super::*;
    use crate::ca::issuer::Issuer;
    use crate::ca::root::new_root;
    use crate::cert::{CertificateRequest, SignRequest, X509Subject};
    use crate::config::{AiaConfig, CaConfig};
    use crate::csr::create_csr;
    use crate::profile::CertProfile;

    fn make_chain(provider: &SoftwareProvider) -> (String, String) {
        let root = new_root(
            &CertificateRequest {
                common_name: "Bundle Root CA".to_string(),
                ..Default::default()
            },
            CaConfig::default(),
            provider,
        )
        .unwrap();

        let mut profile = CertProfile {
            usage: vec!["signing".to_string(), "server auth".to_string()],
            expiry: Duration::from_secs(365 * 24 * 3600),
            ..Default::default()
        };
        profile.validate("server").unwrap();
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), profile);

        let bundle = Bundle::from_pem(&root.cert_pem, None, None).unwrap();
        let signer = provider.load_signer(&root.key.locator).unwrap();
        let issuer =
            Issuer::new("primary", bundle, signer, profiles, AiaConfig::default()).unwrap();

        let handle = provider.generate_key("leaf", Algorithm::Ed25519).unwrap();
        let leaf_signer = provider.signer(handle).unwrap();
        let csr = create_csr(
            leaf_signer.as_ref(),
            &X509Subject {
                common_name: "leaf.example.com".to_string(),
                ..Default::default()
            },
            &[],
        )
        .unwrap();
        let signed = issuer
            .sign(&SignRequest {
                hosts: vec!["leaf.example.com".to_string(), "alt.example.com".to_string()],
                csr: csr.to_pem().unwrap(),
                ..Default::default()
            })
            .unwrap();

        (signed.pem, root.cert_pem)
    }

    /// Minimal certificate with an arbitrary issuer name and signing
    /// key, for shapes the issuing pipeline refuses to produce
    fn raw_cert(
        subject_cn: &str,
        issuer_cn: &str,
        subject_spki: &[u8],
        issuer_signer: &dyn Signer,
    ) -> String {
        use x509_cert::certificate::{TbsCertificate, Version};
        use x509_cert::spki::SubjectPublicKeyInfoOwned;
        use x509_cert::time::Validity;

        let now = time::OffsetDateTime::now_utc().unix_timestamp() as u64;
        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number: crate::cert::generate_serial().unwrap(),
            signature: issuer_signer.signature_algorithm(),
            issuer: crate::cert::build_name(&X509Subject {
                common_name: issuer_cn.to_string(),
                ..Default::default()
            })
            .unwrap(),
            validity: Validity {
                not_before: crate::extensions::asn1_time(now - 3600).unwrap(),
                not_after: crate::extensions::asn1_time(now + 365 * 24 * 3600).unwrap(),
            },
            subject: crate::cert::build_name(&X509Subject {
                common_name: subject_cn.to_string(),
                ..Default::default()
            })
            .unwrap(),
            subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(subject_spki).unwrap(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: None,
        };
        let signature = issuer_signer.sign(&tbs.to_der().unwrap()).unwrap();
        let certificate = Certificate {
            tbs_certificate: tbs,
            signature_algorithm: issuer_signer.signature_algorithm(),
            signature: der::asn1::BitString::from_bytes(&signature).unwrap(),
        };
        cert_to_pem(&certificate).unwrap()
    }

    #[test]
    fn test_cross_signed_intermediates_do_not_loop() {
        let provider = SoftwareProvider::new();
        let signer_a = provider
            .signer(provider.generate_key("cross-a", Algorithm::Ed25519).unwrap())
            .unwrap();
        let signer_b = provider
            .signer(provider.generate_key("cross-b", Algorithm::Ed25519).unwrap())
            .unwrap();
        let leaf_signer = provider
            .signer(provider.generate_key("cross-leaf", Algorithm::Ed25519).unwrap())
            .unwrap();

        // A and B vouch for each other, so the walk from the leaf
        // revisits A and must stop instead of alternating forever
        let cert_a = raw_cert(
            "Cross CA A",
            "Cross CA B",
            &signer_a.public_key_der().unwrap(),
            signer_b.as_ref(),
        );
        let cert_b = raw_cert(
            "Cross CA B",
            "Cross CA A",
            &signer_b.public_key_der().unwrap(),
            signer_a.as_ref(),
        );
        let leaf = raw_cert(
            "cross.example.com",
            "Cross CA A",
            &leaf_signer.public_key_der().unwrap(),
            signer_a.as_ref(),
        );

        let bundle = Bundle::from_pem(&leaf, Some(&format!("{cert_a}{cert_b}")), None).unwrap();
        assert!(bundle.is_untrusted());
        assert!(bundle
            .status()
            .issues
            .iter()
            .any(|issue| issue.level == IssueLevel::Error && issue.message.contains("loops")));
    }

    #[test]
    fn test_self_signed_leaf_is_its_own_anchor() {
        let provider = SoftwareProvider::new();
        let root = new_root(
            &CertificateRequest {
                common_name: "Solo Root CA".to_string(),
                ..Default::default()
            },
            CaConfig::default(),
            &provider,
        )
        .unwrap();

        let bundle = Bundle::from_pem(&root.cert_pem, None, None).unwrap();
        assert!(!bundle.is_untrusted());
        assert_eq!(bundle.chain().len(), 1);
        assert_eq!(bundle.subject_id(), bundle.issuer_id());
        assert_eq!(bundle.subject_dn(), bundle.issuer_dn());
        assert!(bundle.intermediates_pem().is_empty());
    }

    #[test]
    fn test_leaf_chains_to_root() {
        let provider = SoftwareProvider::new();
        let (leaf_pem, root_pem) = make_chain(&provider);

        let bundle = Bundle::from_pem(&leaf_pem, None, Some(&root_pem)).unwrap();
        assert!(!bundle.is_untrusted());
        assert_eq!(bundle.chain().len(), 2);
        assert_ne!(bundle.subject_id(), bundle.issuer_id());
        assert!(bundle.issuer_dn().contains("Bundle Root CA"));
        assert!(bundle
            .hostnames()
            .contains(&"leaf.example.com".to_string()));
        assert!(bundle
            .hostnames()
            .contains(&"alt.example.com".to_string()));
        assert!(!bundle.root_pem().is_empty());
    }

    #[test]
    fn test_leaf_without_anchor_is_untrusted() {
        let provider = SoftwareProvider::new();
        let (leaf_pem, _root_pem) = make_chain(&provider);

        let bundle = Bundle::from_pem(&leaf_pem, None, None).unwrap();
        assert!(bundle.is_untrusted());
        assert!(bundle
            .status()
            .issues
            .iter()
            .any(|issue| issue.level == IssueLevel::Error));
    }

    #[test]
    fn test_leaf_rejects_foreign_root() {
        let provider = SoftwareProvider::new();
        let (leaf_pem, _) = make_chain(&provider);
        let other = new_root(
            &CertificateRequest {
                common_name: "Unrelated Root CA".to_string(),
                ..Default::default()
            },
            CaConfig::default(),
            &provider,
        )
        .unwrap();

        let bundle = Bundle::from_pem(&leaf_pem, None, Some(&other.cert_pem)).unwrap();
        assert!(bundle.is_untrusted());
    }

    #[test]
    fn test_subject_id_prefers_ski() {
        let provider = SoftwareProvider::new();
        let (leaf_pem, root_pem) = make_chain(&provider);
        let bundle = Bundle::from_pem(&leaf_pem, None, Some(&root_pem)).unwrap();

        // issued certificates carry an SKI, so the id is its hex form
        let leaf = bundle.leaf();
        let ski_hex = subject_id_of(leaf).unwrap();
        assert_eq!(bundle.subject_id(), ski_hex);
        assert_eq!(ski_hex.len(), 40);
    }
}
