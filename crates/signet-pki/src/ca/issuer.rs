//! A single signing identity: its verified bundle, signer and the
//! profiles it may sign under.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use der::{asn1::BitString, asn1::ObjectIdentifier, Decode, Encode};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::debug;
use x509_cert::{
    certificate::{TbsCertificate, Version},
    ext::Extension,
    time::Validity,
    Certificate,
};

use signet_key::Signer;

use crate::{
    bundle::{cert_to_pem, Bundle},
    cert::{self, generate_serial, SignRequest, Template},
    config::{resolve_url, AiaConfig},
    error::{PkiError, Result},
    extensions,
    profile::{CertProfile, CsrWhitelist},
};

/// Digests computed over the issuer's key and name for OCSP-style
/// responder identification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 4] = [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ];

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Key hash (over the raw subject-public-key bit string) and name hash
/// (over the DER subject name) under one digest algorithm
#[derive(Clone, Debug)]
pub struct ResponderHashes {
    pub key_hash: Vec<u8>,
    pub name_hash: Vec<u8>,
}

/// The result of a successful signing call
#[derive(Clone, Debug)]
pub struct SignedCertificate {
    pub certificate: Certificate,
    pub pem: String,
}

/// An immutable signing identity. Built once during authority
/// construction; `sign` touches only per-call state and is safe to
/// call concurrently.
pub struct Issuer {
    label: String,
    /// `None` only for the parentless root/self-sign flow
    bundle: Option<Bundle>,
    signer: Arc<dyn Signer>,
    profiles: HashMap<String, CertProfile>,
    aia: AiaConfig,
    aia_url: String,
    ocsp_url: String,
    crl_url: String,
    hashes: HashMap<DigestAlgorithm, ResponderHashes>,
}

// the signer is an opaque trait object, so no derive
impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut profile_names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        profile_names.sort_unstable();
        f.debug_struct("Issuer")
            .field("label", &self.label)
            .field("parentless", &self.bundle.is_none())
            .field("algorithm", &self.signer.algorithm())
            .field("profiles", &profile_names)
            .finish_non_exhaustive()
    }
}

impl Issuer {
    /// Build an issuer around a verified bundle. Fails when the bundle
    /// could not be anchored to a trusted root.
    pub fn new(
        label: &str,
        bundle: Bundle,
        signer: Arc<dyn Signer>,
        profiles: HashMap<String, CertProfile>,
        aia: AiaConfig,
    ) -> Result<Self> {
        if bundle.is_untrusted() {
            return Err(PkiError::UntrustedChain(format!(
                "issuer {label}: certificate chain is untrusted"
            )));
        }

        let issuer_id = bundle.subject_id().to_string();
        let aia_url = resolve_url(&aia.aia_url, &issuer_id);
        let ocsp_url = resolve_url(&aia.ocsp_url, &issuer_id);
        let crl_url = resolve_url(&aia.crl_url, &issuer_id);
        let hashes = responder_hashes(bundle.leaf())?;

        Ok(Issuer {
            label: label.to_string(),
            bundle: Some(bundle),
            signer,
            profiles,
            aia,
            aia_url,
            ocsp_url,
            crl_url,
            hashes,
        })
    }

    /// Build a parentless issuer for the root/self-sign flow: no
    /// bundle, no resolvable URLs yet.
    pub fn parentless(
        label: &str,
        signer: Arc<dyn Signer>,
        profiles: HashMap<String, CertProfile>,
    ) -> Self {
        Issuer {
            label: label.to_string(),
            bundle: None,
            signer,
            profiles,
            aia: AiaConfig::default(),
            aia_url: String::new(),
            ocsp_url: String::new(),
            crl_url: String::new(),
            hashes: HashMap::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bundle(&self) -> Option<&Bundle> {
        self.bundle.as_ref()
    }

    pub fn profiles(&self) -> &HashMap<String, CertProfile> {
        &self.profiles
    }

    pub fn aia(&self) -> &AiaConfig {
        &self.aia
    }

    /// Resolved caIssuers URL, `${ISSUER_ID}` already substituted
    pub fn aia_url(&self) -> &str {
        &self.aia_url
    }

    pub fn ocsp_url(&self) -> &str {
        &self.ocsp_url
    }

    pub fn crl_url(&self) -> &str {
        &self.crl_url
    }

    /// Responder identification hashes for one digest algorithm.
    /// Empty for a parentless issuer.
    pub fn responder_hashes(&self, algorithm: DigestAlgorithm) -> Option<&ResponderHashes> {
        self.hashes.get(&algorithm)
    }

    /// Sign one certificate according to a profile. The core policy
    /// pipeline: profile lookup, CSR verification, whitelist-gated
    /// template, SAN override, subject merge, allow-list regexes,
    /// serial, custom extensions, field fill, sign, re-parse.
    pub fn sign(&self, request: &SignRequest) -> Result<SignedCertificate> {
        let profile_name = if request.profile.is_empty() {
            "default"
        } else {
            request.profile.as_str()
        };
        let profile = self
            .profiles
            .get(profile_name)
            .ok_or_else(|| PkiError::UnsupportedProfile(profile_name.to_string()))?;

        let csr = crate::csr::Csr::from_pem(&request.csr)
            .map_err(|e| PkiError::InvalidRequest(format!("malformed CSR: {e}")))?;
        csr.verify_signature()
            .map_err(|e| PkiError::InvalidRequest(format!("CSR verification failed: {e}")))?;
        let csr_template = csr.to_template()?;

        let mut template = self.safe_template(csr_template, profile);

        if !request.hosts.is_empty() {
            template.apply_san_override(&request.hosts);
        }
        if let Some(subject) = &request.subject {
            template.subject = subject.merge_onto(&template.subject);
        }

        enforce_name_policy(profile, &template)?;

        template.serial = Some(match &request.serial {
            Some(bytes) => x509_cert::serial_number::SerialNumber::new(bytes)
                .map_err(|e| PkiError::SerialError(format!("invalid requested serial: {e}")))?,
            None => generate_serial()?,
        });

        for custom in &request.extensions {
            if !profile.extension_allowed(&custom.oid) {
                return Err(PkiError::ExtensionNotAllowed(custom.oid.clone()));
            }
            let oid = ObjectIdentifier::new(&custom.oid)
                .map_err(|e| PkiError::InvalidRequest(format!("invalid OID {}: {e}", custom.oid)))?;
            let value = hex::decode(&custom.value).map_err(|e| {
                PkiError::InvalidRequest(format!("extension {} value is not hex: {e}", custom.oid))
            })?;
            template.extra_extensions.push(Extension {
                extn_id: oid,
                critical: custom.critical,
                extn_value: der::asn1::OctetString::new(value)?,
            });
        }

        self.fill_template(&mut template, profile, request)?;

        let signed = self.issue(&template, profile)?;
        debug!(
            issuer = %self.label,
            profile = profile_name,
            subject = %template.subject.common_name,
            "signed certificate"
        );
        Ok(signed)
    }

    /// Copy only whitelisted CSR-derived fields. Public key material
    /// always carries over; the signature algorithm is always the
    /// issuer's own, never the CSR's.
    fn safe_template(&self, csr_template: Template, profile: &CertProfile) -> Template {
        let mut template = Template::new(
            csr_template.public_key.clone(),
            self.signer.signature_algorithm(),
        );
        match &profile.allowed_fields {
            CsrWhitelist::All => {
                template.subject = csr_template.subject;
                template.dns_names = csr_template.dns_names;
                template.ip_addresses = csr_template.ip_addresses;
                template.email_addresses = csr_template.email_addresses;
                template.uris = csr_template.uris;
            }
            CsrWhitelist::Fields(fields) => {
                if fields.subject {
                    template.subject = csr_template.subject;
                }
                if fields.dns {
                    template.dns_names = csr_template.dns_names;
                }
                if fields.ip {
                    template.ip_addresses = csr_template.ip_addresses;
                }
                if fields.email {
                    template.email_addresses = csr_template.email_addresses;
                }
                if fields.uri {
                    template.uris = csr_template.uris;
                }
            }
        }
        template
    }

    /// Populate the remaining certificate fields from the profile:
    /// usages, validity, CA constraints
    fn fill_template(
        &self,
        template: &mut Template,
        profile: &CertProfile,
        request: &SignRequest,
    ) -> Result<()> {
        let usage = profile.usages();
        template.key_usage = usage.key_usage;
        template.ext_key_usage = usage.ext_key_usage;

        let now = time::OffsetDateTime::now_utc().unix_timestamp() as u64;
        let rounded = now - now % 60;
        let backdate = profile.backdate().as_secs();

        match request.not_before {
            Some(explicit) => template.not_before = Some(explicit),
            None => {
                let computed = rounded.saturating_sub(backdate);
                // never narrow an earlier, already-fixed NotBefore
                match template.not_before {
                    Some(existing) if existing <= computed => {}
                    _ => template.not_before = Some(computed),
                }
            }
        }
        let not_before = template.not_before.unwrap_or(rounded);

        match request.not_after {
            Some(explicit) => template.not_after = Some(explicit),
            None => {
                let computed = not_before + profile.expiry.as_secs();
                match template.not_after {
                    Some(existing) if existing >= computed => {}
                    _ => template.not_after = Some(computed),
                }
            }
        }

        template.is_ca = profile.ca_constraint.is_ca;
        if template.is_ca {
            template.max_path_len = profile.ca_constraint.path_len();
            template.clear_sans();
        }
        Ok(())
    }

    /// Encode, sign and re-parse the finished template
    fn issue(&self, template: &Template, profile: &CertProfile) -> Result<SignedCertificate> {
        let subject = cert::build_name(&template.subject)?;
        let (issuer_name, self_signed) = match &self.bundle {
            Some(bundle) => (bundle.leaf().tbs_certificate.subject.clone(), false),
            None => (subject.clone(), true),
        };

        let mut sans_template;
        let template = if self_signed && template.has_sans() {
            // a self-signed certificate never carries subject
            // alternative identities, CA flag or not
            sans_template = template.clone();
            sans_template.clear_sans();
            &sans_template
        } else {
            template
        };

        let serial = template
            .serial
            .clone()
            .ok_or_else(|| PkiError::SerialError("serial number not resolved".to_string()))?;
        let not_before = template
            .not_before
            .ok_or_else(|| PkiError::InvalidRequest("NotBefore not resolved".to_string()))?;
        let not_after = template
            .not_after
            .ok_or_else(|| PkiError::InvalidRequest("NotAfter not resolved".to_string()))?;

        let mut cert_extensions: Vec<Extension> = Vec::new();
        cert_extensions.push(extensions::basic_constraints(
            template.is_ca,
            template.max_path_len,
        )?);
        if !template.key_usage.is_empty() {
            cert_extensions.push(extensions::key_usage(template.key_usage)?);
        }
        if !template.ext_key_usage.is_empty() {
            cert_extensions.push(extensions::ext_key_usage(template.ext_key_usage.clone())?);
        }
        let ski = extensions::subject_key_id(&template.public_key);
        cert_extensions.push(extensions::subject_key_identifier(&ski)?);
        if template.has_sans() {
            cert_extensions.push(extensions::subject_alt_name(
                &template.dns_names,
                &template.ip_addresses,
                &template.email_addresses,
                &template.uris,
                subject.0.is_empty(),
            )?);
        }
        if let Some(aia) = extensions::authority_info_access(&self.ocsp_url, &self.aia_url)? {
            cert_extensions.push(aia);
        }
        if let Some(crl) = extensions::crl_distribution_points(&self.crl_url)? {
            cert_extensions.push(crl);
        }
        if let Some(policies) = extensions::certificate_policies(&profile.policies)? {
            cert_extensions.push(policies);
        }
        if profile.ocsp_no_check {
            cert_extensions.push(extensions::ocsp_no_check()?);
        }
        cert_extensions.extend(template.extra_extensions.iter().cloned());

        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number: serial,
            signature: template.signature_algorithm.clone(),
            issuer: issuer_name,
            validity: Validity {
                not_before: extensions::asn1_time(not_before)?,
                not_after: extensions::asn1_time(not_after)?,
            },
            subject,
            subject_public_key_info: template.public_key.clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(cert_extensions),
        };

        let tbs_der = tbs.to_der()?;
        let signature = self.signer.sign(&tbs_der)?;

        let certificate = Certificate {
            tbs_certificate: tbs,
            signature_algorithm: template.signature_algorithm.clone(),
            signature: BitString::from_bytes(&signature)?,
        };

        let pem = cert_to_pem(&certificate)?;
        // round-trip through DER so the caller gets a value the
        // encoder and decoder agree on
        let certificate = Certificate::from_der(&certificate.to_der()?)?;
        Ok(SignedCertificate { certificate, pem })
    }
}

/// Enforce the profile's allow-list regexes against the common name
/// and every DNS/email/URI identity
fn enforce_name_policy(profile: &CertProfile, template: &Template) -> Result<()> {
    if let Some(regex) = profile.names_regex() {
        let cn = &template.subject.common_name;
        if !cn.is_empty() && !regex.is_match(cn) {
            return Err(PkiError::NameNotAllowed {
                field: "common name",
                value: cn.clone(),
            });
        }
    }
    if let Some(regex) = profile.dns_regex() {
        for dns in &template.dns_names {
            if !regex.is_match(dns) {
                return Err(PkiError::NameNotAllowed {
                    field: "DNS name",
                    value: dns.clone(),
                });
            }
        }
    }
    if let Some(regex) = profile.email_regex() {
        for email in &template.email_addresses {
            if !regex.is_match(email) {
                return Err(PkiError::NameNotAllowed {
                    field: "email address",
                    value: email.clone(),
                });
            }
        }
    }
    if let Some(regex) = profile.uri_regex() {
        for uri in &template.uris {
            if !regex.is_match(uri) {
                return Err(PkiError::NameNotAllowed {
                    field: "URI",
                    value: uri.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Key and name hashes for every supported digest algorithm
fn responder_hashes(
    certificate: &Certificate,
) -> Result<HashMap<DigestAlgorithm, ResponderHashes>> {
    let key_bytes = certificate
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes()
        .to_vec();
    let name_der = certificate.tbs_certificate.subject.to_der()?;

    let mut hashes = HashMap::new();
    for algorithm in DigestAlgorithm::ALL {
        hashes.insert(
            algorithm,
            ResponderHashes {
                key_hash: algorithm.digest(&key_bytes),
                name_hash: algorithm.digest(&name_der),
            },
        );
    }
    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use signet_key::{Algorithm, KeyProvider, SoftwareProvider};
    use x509_cert::ext::pkix::{name::GeneralName, BasicConstraints, SubjectAltName};

    use super::*;
    use crate::ca::root::{new_root, RootIssueResult};
    use crate::cert::{CertificateRequest, CustomExtension, X509Subject};
    use crate::config::CaConfig;
    use crate::csr::create_csr;
    use crate::extensions::oids;

    fn make_root(provider: &SoftwareProvider) -> RootIssueResult {
        let request = CertificateRequest {
            common_name: "Test Root CA".to_string(),
            ..Default::default()
        };
        new_root(&request, CaConfig::default(), provider).unwrap()
    }

    fn server_profile() -> CertProfile {
        let mut profile = CertProfile {
            usage: vec![
                "signing".to_string(),
                "key encipherment".to_string(),
                "server auth".to_string(),
            ],
            expiry: Duration::from_secs(365 * 24 * 3600),
            ..Default::default()
        };
        profile.validate("server").unwrap();
        profile
    }

    fn intermediate_profile() -> CertProfile {
        let mut profile = CertProfile {
            usage: vec!["cert sign".to_string(), "crl sign".to_string()],
            ca_constraint: crate::profile::CaConstraint {
                is_ca: true,
                max_path_len: 1,
            },
            expiry: Duration::from_secs(2 * 365 * 24 * 3600),
            ..Default::default()
        };
        profile.validate("intermediate").unwrap();
        profile
    }

    fn make_issuer(
        provider: &SoftwareProvider,
        root: &RootIssueResult,
        profiles: HashMap<String, CertProfile>,
        aia: AiaConfig,
    ) -> Issuer {
        let bundle = Bundle::from_pem(&root.cert_pem, None, None).unwrap();
        assert!(!bundle.is_untrusted());
        let signer = provider.load_signer(&root.key.locator).unwrap();
        Issuer::new("primary", bundle, signer, profiles, aia).unwrap()
    }

    fn leaf_csr(provider: &SoftwareProvider, common_name: &str) -> String {
        let handle = provider.generate_key("leaf", Algorithm::EcdsaP256).unwrap();
        let signer = provider.signer(handle).unwrap();
        let subject = X509Subject {
            common_name: common_name.to_string(),
            ..Default::default()
        };
        create_csr(signer.as_ref(), &subject, &[])
            .unwrap()
            .to_pem()
            .unwrap()
    }

    #[test]
    fn test_sign_leaf_classifies_sans() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), server_profile());
        let issuer = make_issuer(&provider, &root, profiles, AiaConfig::default());

        let signed = issuer
            .sign(&SignRequest {
                hosts: vec![
                    "leaf.example.com".to_string(),
                    "10.0.0.1".to_string(),
                    "ops@example.com".to_string(),
                ],
                csr: leaf_csr(&provider, "leaf.example.com"),
                ..Default::default()
            })
            .unwrap();

        let cert = &signed.certificate;
        let extensions = cert.tbs_certificate.extensions.as_ref().unwrap();
        let san_ext = extensions
            .iter()
            .find(|e| e.extn_id == oids::ID_CE_SUBJECT_ALT_NAME)
            .expect("SAN present");
        let san = SubjectAltName::from_der(san_ext.extn_value.as_bytes()).unwrap();
        let mut dns = 0;
        let mut ips = 0;
        let mut emails = 0;
        for name in &san.0 {
            match name {
                GeneralName::DnsName(_) => dns += 1,
                GeneralName::IpAddress(_) => ips += 1,
                GeneralName::Rfc822Name(_) => emails += 1,
                _ => {}
            }
        }
        assert_eq!((dns, ips, emails), (1, 1, 1));

        // issued by the root, signature verifies under the root key
        let root_cert = issuer.bundle().unwrap().leaf().clone();
        assert_eq!(
            cert.tbs_certificate.issuer.to_der().unwrap(),
            root_cert.tbs_certificate.subject.to_der().unwrap()
        );
        let spki = root_cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .unwrap();
        let tbs = cert.tbs_certificate.to_der().unwrap();
        assert!(
            signet_key::verify_with_spki(&spki, &tbs, cert.signature.raw_bytes()).unwrap()
        );
    }

    #[test]
    fn test_sign_intermediate_strips_sans_and_sets_path_len() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profiles = HashMap::new();
        profiles.insert("intermediate".to_string(), intermediate_profile());
        let issuer = make_issuer(&provider, &root, profiles, AiaConfig::default());

        let signed = issuer
            .sign(&SignRequest {
                hosts: vec!["intermediate.example.com".to_string()],
                csr: leaf_csr(&provider, "Test Intermediate CA"),
                profile: "intermediate".to_string(),
                ..Default::default()
            })
            .unwrap();

        let extensions = signed.certificate.tbs_certificate.extensions.as_ref().unwrap();
        let bc_ext = extensions
            .iter()
            .find(|e| e.extn_id == oids::ID_CE_BASIC_CONSTRAINTS)
            .unwrap();
        let bc = BasicConstraints::from_der(bc_ext.extn_value.as_bytes()).unwrap();
        assert!(bc.ca);
        assert_eq!(bc.path_len_constraint, Some(1));
        assert!(extensions
            .iter()
            .all(|e| e.extn_id != oids::ID_CE_SUBJECT_ALT_NAME));
    }

    #[test]
    fn test_sign_unknown_profile_fails() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), server_profile());
        let issuer = make_issuer(&provider, &root, profiles, AiaConfig::default());

        let err = issuer
            .sign(&SignRequest {
                csr: leaf_csr(&provider, "leaf.example.com"),
                profile: "nonexistent".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, PkiError::UnsupportedProfile(name) if name == "nonexistent"));
    }

    #[test]
    fn test_sign_enforces_dns_allow_list() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profile = server_profile();
        profile.allowed_dns = r"^[a-z]+\.example\.com$".to_string();
        profile.validate("server").unwrap();
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), profile);
        let issuer = make_issuer(&provider, &root, profiles, AiaConfig::default());

        let err = issuer
            .sign(&SignRequest {
                hosts: vec!["evil.attacker.com".to_string()],
                csr: leaf_csr(&provider, "leaf.example.com"),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("evil.attacker.com"));
    }

    #[test]
    fn test_sign_rejects_unlisted_custom_extension() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), server_profile());
        let issuer = make_issuer(&provider, &root, profiles, AiaConfig::default());

        let err = issuer
            .sign(&SignRequest {
                csr: leaf_csr(&provider, "leaf.example.com"),
                extensions: vec![CustomExtension {
                    oid: "1.2.3.4.5".to_string(),
                    critical: false,
                    value: "0500".to_string(),
                }],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, PkiError::ExtensionNotAllowed(oid) if oid == "1.2.3.4.5"));
    }

    #[test]
    fn test_issuer_resolves_url_templates() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), server_profile());
        let aia = AiaConfig {
            ocsp_url: "http://ca.example.com/ocsp/${ISSUER_ID}".to_string(),
            crl_url: "http://ca.example.com/crl/${ISSUER_ID}".to_string(),
            ..Default::default()
        };
        let issuer = make_issuer(&provider, &root, profiles, aia);

        let subject_id = issuer.bundle().unwrap().subject_id().to_string();
        assert_eq!(
            issuer.ocsp_url(),
            format!("http://ca.example.com/ocsp/{subject_id}")
        );
        assert!(!issuer.crl_url().contains("${ISSUER_ID}"));

        let hashes = issuer.responder_hashes(DigestAlgorithm::Sha256).unwrap();
        assert_eq!(hashes.key_hash.len(), 32);
        assert_eq!(hashes.name_hash.len(), 32);
        assert_eq!(
            issuer
                .responder_hashes(DigestAlgorithm::Sha1)
                .unwrap()
                .key_hash
                .len(),
            20
        );
    }

    #[test]
    fn test_sign_whitelist_drops_unlisted_csr_fields() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profile = server_profile();
        profile.allowed_fields =
            CsrWhitelist::Fields(crate::profile::CsrFields {
                subject: true,
                ..Default::default()
            });
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), profile);
        let issuer = make_issuer(&provider, &root, profiles, AiaConfig::default());

        // the CSR requests a DNS SAN, but the whitelist only admits
        // the subject
        let handle = provider.generate_key("leaf", Algorithm::Ed25519).unwrap();
        let signer = provider.signer(handle).unwrap();
        let csr = crate::csr::create_csr(
            signer.as_ref(),
            &X509Subject {
                common_name: "leaf.example.com".to_string(),
                ..Default::default()
            },
            &["leaf.example.com".to_string()],
        )
        .unwrap();

        let signed = issuer
            .sign(&SignRequest {
                csr: csr.to_pem().unwrap(),
                ..Default::default()
            })
            .unwrap();

        let extensions = signed.certificate.tbs_certificate.extensions.as_ref().unwrap();
        assert!(extensions
            .iter()
            .all(|e| e.extn_id != oids::ID_CE_SUBJECT_ALT_NAME));
        assert!(crate::cert::name_to_string(&signed.certificate.tbs_certificate.subject)
            .contains("leaf.example.com"));
    }

    #[test]
    fn test_sign_without_subject_yields_critical_san() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profile = server_profile();
        // the subject never carries over, so the certificate is
        // identified by its alternative names alone
        profile.allowed_fields = CsrWhitelist::Fields(crate::profile::CsrFields {
            dns: true,
            ..Default::default()
        });
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), profile);
        let issuer = make_issuer(&provider, &root, profiles, AiaConfig::default());

        let handle = provider.generate_key("leaf", Algorithm::Ed25519).unwrap();
        let signer = provider.signer(handle).unwrap();
        let csr = crate::csr::create_csr(
            signer.as_ref(),
            &X509Subject {
                common_name: "leaf.example.com".to_string(),
                ..Default::default()
            },
            &["leaf.example.com".to_string()],
        )
        .unwrap();

        let signed = issuer
            .sign(&SignRequest {
                csr: csr.to_pem().unwrap(),
                ..Default::default()
            })
            .unwrap();

        let tbs = &signed.certificate.tbs_certificate;
        assert!(tbs.subject.0.is_empty());
        let san_ext = tbs
            .extensions
            .as_ref()
            .unwrap()
            .iter()
            .find(|e| e.extn_id == oids::ID_CE_SUBJECT_ALT_NAME)
            .expect("SAN present");
        assert!(san_ext.critical);
    }

    #[test]
    fn test_sign_honors_explicit_serial_and_validity() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), server_profile());
        let issuer = make_issuer(&provider, &root, profiles, AiaConfig::default());

        let not_before = 1_700_000_000u64;
        let not_after = 1_731_536_000u64;
        let signed = issuer
            .sign(&SignRequest {
                csr: leaf_csr(&provider, "leaf.example.com"),
                serial: Some(vec![0x01, 0x02, 0x03, 0x04]),
                not_before: Some(not_before),
                not_after: Some(not_after),
                ..Default::default()
            })
            .unwrap();

        let tbs = &signed.certificate.tbs_certificate;
        assert_eq!(
            tbs.serial_number,
            x509_cert::serial_number::SerialNumber::new(&[0x01, 0x02, 0x03, 0x04]).unwrap()
        );
        assert_eq!(
            crate::bundle::time_to_unix(&tbs.validity.not_before),
            not_before
        );
        assert_eq!(
            crate::bundle::time_to_unix(&tbs.validity.not_after),
            not_after
        );
    }

    #[test]
    fn test_sign_backdates_not_before() {
        let provider = SoftwareProvider::new();
        let root = make_root(&provider);
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), server_profile());
        let issuer = make_issuer(&provider, &root, profiles, AiaConfig::default());

        let signed = issuer
            .sign(&SignRequest {
                csr: leaf_csr(&provider, "leaf.example.com"),
                ..Default::default()
            })
            .unwrap();

        let now = time::OffsetDateTime::now_utc().unix_timestamp() as u64;
        let not_before = crate::bundle::time_to_unix(
            &signed.certificate.tbs_certificate.validity.not_before,
        );
        // now rounded to the minute, minus the five minute default
        assert!(not_before <= now - 5 * 60 + 60);
        assert!(not_before >= now - 6 * 60 - 60);
        let not_after =
            crate::bundle::time_to_unix(&signed.certificate.tbs_certificate.validity.not_after);
        assert_eq!(not_after - not_before, 365 * 24 * 3600);
    }
}
