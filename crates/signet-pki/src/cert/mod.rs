//! Certificate template plumbing: the per-call mutable skeleton built
//! from a CSR, SAN classification, distinguished-name conversion and
//! serial number generation.

pub mod types;

use std::net::IpAddr;

use der::{
    asn1::{ObjectIdentifier, SetOfVec, Utf8StringRef},
    Encode,
};
use flagset::FlagSet;
use spki::AlgorithmIdentifierOwned;
use x509_cert::{
    attr::AttributeTypeAndValue,
    ext::{pkix::KeyUsages, Extension},
    name::{Name, RdnSequence, RelativeDistinguishedName},
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
};

pub use types::{
    CertificateRequest, CustomExtension, KeyRequest, SignRequest, X509Name, X509Subject,
};

use crate::error::{PkiError, Result};
use crate::extensions::oids;

/// A SAN entry classified by content
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SanEntry {
    Dns(String),
    Ip(IpAddr),
    Email(String),
    Uri(String),
}

/// Classify a SAN string: scheme separator makes it a URI, an IP
/// literal an address, a `@` an email address, anything else a DNS
/// name.
pub fn classify_san(host: &str) -> SanEntry {
    if host.contains("://") {
        SanEntry::Uri(host.to_string())
    } else if let Ok(ip) = host.parse::<IpAddr>() {
        SanEntry::Ip(ip)
    } else if host.contains('@') {
        SanEntry::Email(host.to_string())
    } else {
        SanEntry::Dns(host.to_string())
    }
}

/// Generate a certificate serial number: 20 cryptographically random
/// bytes with the most significant bit cleared, so the DER INTEGER is
/// positive and at most 20 octets (RFC 5280 4.1.2.2)
pub fn generate_serial() -> Result<SerialNumber> {
    let bytes = serial_bytes()?;
    SerialNumber::new(&bytes).map_err(|e| PkiError::SerialError(e.to_string()))
}

pub(crate) fn serial_bytes() -> Result<[u8; 20]> {
    let mut bytes = [0u8; 20];
    getrandom::fill(&mut bytes)
        .map_err(|e| PkiError::SerialError(format!("random source failed: {e}")))?;
    bytes[0] &= 0x7F;
    Ok(bytes)
}

/// The per-call certificate skeleton. `Issuer::sign` builds one from
/// the CSR, mutates it through the policy steps and only then encodes
/// it; nothing here is shared between calls.
#[derive(Clone, Debug)]
pub struct Template {
    pub subject: X509Subject,
    pub public_key: SubjectPublicKeyInfoOwned,
    pub signature_algorithm: AlgorithmIdentifierOwned,

    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub email_addresses: Vec<String>,
    pub uris: Vec<String>,

    pub serial: Option<SerialNumber>,
    /// Unix seconds; `None` until resolved
    pub not_before: Option<u64>,
    pub not_after: Option<u64>,

    pub is_ca: bool,
    pub max_path_len: Option<u8>,
    pub key_usage: FlagSet<KeyUsages>,
    pub ext_key_usage: Vec<ObjectIdentifier>,

    pub extra_extensions: Vec<Extension>,
}

impl Template {
    pub fn new(
        public_key: SubjectPublicKeyInfoOwned,
        signature_algorithm: AlgorithmIdentifierOwned,
    ) -> Self {
        Self {
            subject: X509Subject::default(),
            public_key,
            signature_algorithm,
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            email_addresses: Vec::new(),
            uris: Vec::new(),
            serial: None,
            not_before: None,
            not_after: None,
            is_ca: false,
            max_path_len: None,
            key_usage: FlagSet::default(),
            ext_key_usage: Vec::new(),
            extra_extensions: Vec::new(),
        }
    }

    /// Replace every SAN category with the classified entries of an
    /// explicit host list. An explicit list replaces rather than
    /// appends, even when a category ends up empty.
    pub fn apply_san_override(&mut self, hosts: &[String]) {
        self.dns_names.clear();
        self.ip_addresses.clear();
        self.email_addresses.clear();
        self.uris.clear();
        for host in hosts {
            match classify_san(host) {
                SanEntry::Dns(dns) => self.dns_names.push(dns),
                SanEntry::Ip(ip) => self.ip_addresses.push(ip),
                SanEntry::Email(email) => self.email_addresses.push(email),
                SanEntry::Uri(uri) => self.uris.push(uri),
            }
        }
    }

    /// Drop all subject-alternative identities (CA certificates carry
    /// none in this design)
    pub fn clear_sans(&mut self) {
        self.dns_names.clear();
        self.ip_addresses.clear();
        self.email_addresses.clear();
        self.uris.clear();
    }

    pub fn has_sans(&self) -> bool {
        !self.dns_names.is_empty()
            || !self.ip_addresses.is_empty()
            || !self.email_addresses.is_empty()
            || !self.uris.is_empty()
    }
}

fn push_rdn(rdns: &mut Vec<RelativeDistinguishedName>, oid: ObjectIdentifier, value: &str) -> Result<()> {
    let value = Utf8StringRef::new(value)
        .map_err(|e| PkiError::InvalidRequest(format!("invalid DN value {value:?}: {e}")))?;
    let mut set = SetOfVec::new();
    set.insert(AttributeTypeAndValue {
        oid,
        value: der::Any::from(value),
    })
    .map_err(|e| PkiError::InvalidRequest(format!("failed to build RDN: {e}")))?;
    rdns.push(RelativeDistinguishedName(set));
    Ok(())
}

/// Build an X.509 distinguished name from a structured subject. A
/// subject with nothing set yields an empty name; SAN-only
/// certificates are legal as long as the alternative name extension
/// is marked critical.
pub fn build_name(subject: &X509Subject) -> Result<Name> {
    let mut rdns = Vec::new();

    if !subject.common_name.is_empty() {
        push_rdn(&mut rdns, oids::AT_COMMON_NAME, &subject.common_name)?;
    }

    for name in &subject.names {
        if let Some(ref org) = name.organization {
            push_rdn(&mut rdns, oids::AT_ORGANIZATION, org)?;
        }
        if let Some(ref ou) = name.organizational_unit {
            push_rdn(&mut rdns, oids::AT_ORGANIZATIONAL_UNIT, ou)?;
        }
        if let Some(ref country) = name.country {
            push_rdn(&mut rdns, oids::AT_COUNTRY, country)?;
        }
        if let Some(ref state) = name.state {
            push_rdn(&mut rdns, oids::AT_STATE, state)?;
        }
        if let Some(ref locality) = name.locality {
            push_rdn(&mut rdns, oids::AT_LOCALITY, locality)?;
        }
    }

    if !subject.serial_number.is_empty() {
        push_rdn(&mut rdns, oids::AT_SERIAL_NUMBER, &subject.serial_number)?;
    }

    Ok(Name::from(RdnSequence::from(rdns)))
}

/// Parse an X.509 distinguished name back into the structured form
pub fn parse_name(name: &Name) -> X509Subject {
    let mut subject = X509Subject::default();
    let mut attrs = X509Name::default();

    for rdn in name.0.iter() {
        for attr in rdn.0.iter() {
            let value = match Utf8StringRef::try_from(&attr.value) {
                Ok(utf8) => utf8.as_str().to_string(),
                Err(_) => match der::asn1::PrintableStringRef::try_from(&attr.value) {
                    Ok(printable) => printable.as_str().to_string(),
                    Err(_) => continue,
                },
            };

            if attr.oid == oids::AT_COMMON_NAME {
                subject.common_name = value;
            } else if attr.oid == oids::AT_ORGANIZATION {
                attrs.organization = Some(value);
            } else if attr.oid == oids::AT_ORGANIZATIONAL_UNIT {
                attrs.organizational_unit = Some(value);
            } else if attr.oid == oids::AT_COUNTRY {
                attrs.country = Some(value);
            } else if attr.oid == oids::AT_STATE {
                attrs.state = Some(value);
            } else if attr.oid == oids::AT_LOCALITY {
                attrs.locality = Some(value);
            } else if attr.oid == oids::AT_SERIAL_NUMBER {
                subject.serial_number = value;
            }
        }
    }

    if !attrs.is_empty() {
        subject.names.push(attrs);
    }
    subject
}

/// Render a distinguished name as a one-line string for ids and logs
pub fn name_to_string(name: &Name) -> String {
    let subject = parse_name(name);
    let mut parts = Vec::new();
    if !subject.common_name.is_empty() {
        parts.push(format!("CN={}", subject.common_name));
    }
    for attrs in &subject.names {
        if let Some(ref org) = attrs.organization {
            parts.push(format!("O={org}"));
        }
        if let Some(ref ou) = attrs.organizational_unit {
            parts.push(format!("OU={ou}"));
        }
        if let Some(ref country) = attrs.country {
            parts.push(format!("C={country}"));
        }
        if let Some(ref state) = attrs.state {
            parts.push(format!("ST={state}"));
        }
        if let Some(ref locality) = attrs.locality {
            parts.push(format!("L={locality}"));
        }
    }
    parts.join(",")
}

/// DER encoding of a distinguished name (for comparisons and hashing)
pub fn name_der(name: &Name) -> Result<Vec<u8>> {
    Ok(name.to_der()?)
}
