//! X.509 extension construction.
//!
//! Everything that touches the DER wire format of certificate
//! extensions lives here, isolated from policy evaluation so the
//! encodings can be tested on their own: Subject Key Identifier,
//! SubjectAltName, key usage, basic constraints, AIA / CRL
//! distribution points, CertificatePolicies and the OCSP no-check
//! marker.

use der::{
    asn1::{Ia5String, ObjectIdentifier, OctetString, UtcTime},
    Any, Encode, Sequence,
};
use flagset::FlagSet;
use sha1::{Digest, Sha1};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::{
    ext::{
        pkix::{
            certpolicy::{PolicyInformation, PolicyQualifierInfo},
            crl::dp::DistributionPoint,
            name::{DistributionPointName, GeneralName},
            AccessDescription, AuthorityInfoAccessSyntax, BasicConstraints, CertificatePolicies,
            CrlDistributionPoints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName,
            SubjectKeyIdentifier,
        },
        Extension,
    },
    time::Time,
};

use crate::{
    error::{PkiError, Result},
    profile::{CertificatePolicy, PolicyQualifier},
};

/// OID constants used across the crate
pub mod oids {
    use der::asn1::ObjectIdentifier;

    pub use const_oid::db::rfc5280::{
        ID_CE_BASIC_CONSTRAINTS, ID_CE_CERTIFICATE_POLICIES, ID_CE_CRL_DISTRIBUTION_POINTS,
        ID_CE_EXT_KEY_USAGE, ID_CE_KEY_USAGE, ID_CE_SUBJECT_ALT_NAME, ID_CE_SUBJECT_KEY_IDENTIFIER,
        ID_PE_AUTHORITY_INFO_ACCESS,
    };

    // access methods
    pub const AD_OCSP: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");
    pub const AD_CA_ISSUERS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.2");

    // policy qualifier types
    pub const ID_QT_CPS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.2.1");
    pub const ID_QT_UNOTICE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.2.2");

    /// id-pkix-ocsp-nocheck
    pub const OCSP_NO_CHECK: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1.5");

    // extended key usage purposes
    pub const EKU_ANY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");
    pub const EKU_SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");
    pub const EKU_CLIENT_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.2");
    pub const EKU_CODE_SIGNING: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.3");
    pub const EKU_EMAIL_PROTECTION: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.4");
    pub const EKU_IPSEC_END_SYSTEM: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.5");
    pub const EKU_IPSEC_TUNNEL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.6");
    pub const EKU_IPSEC_USER: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.7");
    pub const EKU_TIMESTAMPING: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.8");
    pub const EKU_OCSP_SIGNING: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.9");
    pub const EKU_MICROSOFT_SGC: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.10.3.3");
    pub const EKU_NETSCAPE_SGC: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("2.16.840.1.113730.4.1");

    // distinguished name attribute types
    pub const AT_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
    pub const AT_SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
    pub const AT_COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
    pub const AT_LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
    pub const AT_STATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
    pub const AT_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
    pub const AT_ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

    /// PKCS#9 extensionRequest CSR attribute
    pub const EXTENSION_REQUEST: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");
}

/// UserNotice qualifier body (RFC 5280 4.2.1.4), explicit text only
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct UserNotice {
    pub explicit_text: Option<String>,
}

fn make_extension(extn_id: ObjectIdentifier, critical: bool, value_der: Vec<u8>) -> Result<Extension> {
    Ok(Extension {
        extn_id,
        critical,
        extn_value: OctetString::new(value_der)?,
    })
}

/// Subject Key Identifier: SHA-1 over the raw, unpadded public key bit
/// string (RFC 5280 method 1)
pub fn subject_key_id(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec()
}

pub fn subject_key_identifier(ski: &[u8]) -> Result<Extension> {
    let value = SubjectKeyIdentifier(OctetString::new(ski.to_vec())?);
    make_extension(oids::ID_CE_SUBJECT_KEY_IDENTIFIER, false, value.to_der()?)
}

pub fn basic_constraints(is_ca: bool, path_len: Option<u8>) -> Result<Extension> {
    let value = BasicConstraints {
        ca: is_ca,
        path_len_constraint: if is_ca { path_len } else { None },
    };
    make_extension(oids::ID_CE_BASIC_CONSTRAINTS, true, value.to_der()?)
}

pub fn key_usage(flags: FlagSet<KeyUsages>) -> Result<Extension> {
    let value = KeyUsage(flags);
    make_extension(oids::ID_CE_KEY_USAGE, true, value.to_der()?)
}

pub fn ext_key_usage(purposes: Vec<ObjectIdentifier>) -> Result<Extension> {
    let value = ExtendedKeyUsage(purposes);
    make_extension(oids::ID_CE_EXT_KEY_USAGE, false, value.to_der()?)
}

/// Encode DNS/IP/email/URI identities as a SubjectAltName extension.
/// RFC 5280 requires the extension to be critical when the subject
/// name is empty.
pub fn subject_alt_name(
    dns_names: &[String],
    ip_addresses: &[std::net::IpAddr],
    email_addresses: &[String],
    uris: &[String],
    critical: bool,
) -> Result<Extension> {
    let mut names = Vec::new();
    for dns in dns_names {
        names.push(GeneralName::DnsName(ia5(dns)?));
    }
    for email in email_addresses {
        names.push(GeneralName::Rfc822Name(ia5(email)?));
    }
    for uri in uris {
        names.push(GeneralName::UniformResourceIdentifier(ia5(uri)?));
    }
    for ip in ip_addresses {
        let octets = match ip {
            std::net::IpAddr::V4(v4) => v4.octets().to_vec(),
            std::net::IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        names.push(GeneralName::IpAddress(OctetString::new(octets)?));
    }
    let value = SubjectAltName(names);
    make_extension(oids::ID_CE_SUBJECT_ALT_NAME, critical, value.to_der()?)
}

/// Authority Information Access from resolved OCSP / caIssuers URLs.
/// Empty URLs are skipped; returns `None` when both are empty.
pub fn authority_info_access(ocsp_url: &str, aia_url: &str) -> Result<Option<Extension>> {
    let mut descriptions = Vec::new();
    if !ocsp_url.is_empty() {
        descriptions.push(AccessDescription {
            access_method: oids::AD_OCSP,
            access_location: GeneralName::UniformResourceIdentifier(ia5(ocsp_url)?),
        });
    }
    if !aia_url.is_empty() {
        descriptions.push(AccessDescription {
            access_method: oids::AD_CA_ISSUERS,
            access_location: GeneralName::UniformResourceIdentifier(ia5(aia_url)?),
        });
    }
    if descriptions.is_empty() {
        return Ok(None);
    }
    let value = AuthorityInfoAccessSyntax(descriptions);
    Ok(Some(make_extension(
        oids::ID_PE_AUTHORITY_INFO_ACCESS,
        false,
        value.to_der()?,
    )?))
}

pub fn crl_distribution_points(crl_url: &str) -> Result<Option<Extension>> {
    if crl_url.is_empty() {
        return Ok(None);
    }
    let point = DistributionPoint {
        distribution_point: Some(DistributionPointName::FullName(vec![
            GeneralName::UniformResourceIdentifier(ia5(crl_url)?),
        ])),
        reasons: None,
        crl_issuer: None,
    };
    let value = CrlDistributionPoints(vec![point]);
    Ok(Some(make_extension(
        oids::ID_CE_CRL_DISTRIBUTION_POINTS,
        false,
        value.to_der()?,
    )?))
}

/// CertificatePolicies: a sequence of PolicyInformation entries, each
/// an OID plus optional CPS / UserNotice qualifiers. Unknown qualifier
/// types are rejected earlier, at profile validation.
pub fn certificate_policies(policies: &[CertificatePolicy]) -> Result<Option<Extension>> {
    if policies.is_empty() {
        return Ok(None);
    }
    let mut entries = Vec::new();
    for policy in policies {
        let policy_identifier = ObjectIdentifier::new(&policy.id)
            .map_err(|e| PkiError::PolicyError(format!("invalid policy OID {}: {e}", policy.id)))?;

        let mut qualifiers = Vec::new();
        for qualifier in &policy.qualifiers {
            let info = match qualifier.to_qualifier()? {
                PolicyQualifier::Cps(uri) => PolicyQualifierInfo {
                    policy_qualifier_id: oids::ID_QT_CPS,
                    qualifier: Some(Any::encode_from(&ia5(&uri)?)?),
                },
                PolicyQualifier::UserNotice(text) => PolicyQualifierInfo {
                    policy_qualifier_id: oids::ID_QT_UNOTICE,
                    qualifier: Some(Any::encode_from(&UserNotice {
                        explicit_text: Some(text),
                    })?),
                },
            };
            qualifiers.push(info);
        }

        entries.push(PolicyInformation {
            policy_identifier,
            policy_qualifiers: if qualifiers.is_empty() {
                None
            } else {
                Some(qualifiers)
            },
        });
    }
    let value = CertificatePolicies(entries);
    Ok(Some(make_extension(
        oids::ID_CE_CERTIFICATE_POLICIES,
        false,
        value.to_der()?,
    )?))
}

/// id-pkix-ocsp-nocheck: a DER NULL under the standard OID
pub fn ocsp_no_check() -> Result<Extension> {
    make_extension(oids::OCSP_NO_CHECK, false, vec![0x05, 0x00])
}

/// ASN.1 Time from a unix timestamp: UTCTime until 2049, then
/// GeneralizedTime (RFC 5280 4.1.2.5)
pub fn asn1_time(unix_secs: u64) -> Result<Time> {
    let duration = std::time::Duration::from_secs(unix_secs);
    match UtcTime::from_unix_duration(duration) {
        Ok(utc) => Ok(Time::UtcTime(utc)),
        Err(_) => Ok(Time::GeneralTime(
            der::asn1::GeneralizedTime::from_unix_duration(duration)?,
        )),
    }
}

fn ia5(s: &str) -> Result<Ia5String> {
    Ia5String::new(s).map_err(|e| PkiError::InvalidRequest(format!("invalid IA5 string {s:?}: {e}")))
}
