//! Issuance profiles: named, validated signing policies.
//!
//! A profile declares what a certificate signed under it may contain:
//! key usages, CA constraints, validity window, allowed extensions and
//! regex allow-lists for names. Validation runs once at configuration
//! load and caches the compiled regexes so the signing path never pays
//! compilation cost.

use std::time::Duration;

use der::asn1::ObjectIdentifier;
use flagset::FlagSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use x509_cert::ext::pkix::KeyUsages;

use crate::{
    error::{PkiError, Result},
    extensions::oids,
};

/// CA constraints declared by a profile.
///
/// `max_path_len` of -1 means no path length constraint.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CaConstraint {
    #[serde(default)]
    pub is_ca: bool,
    #[serde(default = "default_path_len")]
    pub max_path_len: i32,
}

fn default_path_len() -> i32 {
    -1
}

impl Default for CaConstraint {
    fn default() -> Self {
        Self {
            is_ca: false,
            max_path_len: -1,
        }
    }
}

impl CaConstraint {
    /// Path length for the BasicConstraints encoding; `None` when
    /// unconstrained or not a CA
    pub fn path_len(&self) -> Option<u8> {
        if self.is_ca && self.max_path_len >= 0 {
            Some(self.max_path_len as u8)
        } else {
            None
        }
    }
}

/// Field categories copied from a CSR when a whitelist is configured
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CsrFields {
    #[serde(default)]
    pub subject: bool,
    #[serde(default)]
    pub dns: bool,
    #[serde(default)]
    pub ip: bool,
    #[serde(default)]
    pub uri: bool,
    #[serde(default)]
    pub email: bool,
}

/// What a profile takes from the CSR: everything, or only the
/// whitelisted field categories. Public key material and the declared
/// signature algorithm are always carried regardless.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(from = "Option<CsrFields>", into = "Option<CsrFields>")]
pub enum CsrWhitelist {
    All,
    Fields(CsrFields),
}

impl Default for CsrWhitelist {
    fn default() -> Self {
        CsrWhitelist::All
    }
}

impl From<Option<CsrFields>> for CsrWhitelist {
    fn from(fields: Option<CsrFields>) -> Self {
        match fields {
            None => CsrWhitelist::All,
            Some(fields) => CsrWhitelist::Fields(fields),
        }
    }
}

impl From<CsrWhitelist> for Option<CsrFields> {
    fn from(whitelist: CsrWhitelist) -> Self {
        match whitelist {
            CsrWhitelist::All => None,
            CsrWhitelist::Fields(fields) => Some(fields),
        }
    }
}

/// One qualifier attached to a certificate policy, as configured
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyQualifierConfig {
    /// Qualifier type: `id-qt-cps` or `id-qt-unotice`
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Validated qualifier form consumed by the extension encoder
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PolicyQualifier {
    /// CPS URI, carried as an IA5String
    Cps(String),
    /// UserNotice with explicit text
    UserNotice(String),
}

impl PolicyQualifierConfig {
    pub fn to_qualifier(&self) -> Result<PolicyQualifier> {
        match self.kind.as_str() {
            "id-qt-cps" => Ok(PolicyQualifier::Cps(self.value.clone())),
            "id-qt-unotice" => Ok(PolicyQualifier::UserNotice(self.value.clone())),
            other => Err(PkiError::PolicyError(format!(
                "unknown policy qualifier type: {other}"
            ))),
        }
    }
}

/// One certificate policy declaration: OID plus optional qualifiers
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CertificatePolicy {
    pub id: String,
    #[serde(default)]
    pub qualifiers: Vec<PolicyQualifierConfig>,
}

/// Key usage and extended key usage resolved from a profile's usage
/// name list
#[derive(Clone, Debug, Default)]
pub struct ResolvedUsage {
    pub key_usage: FlagSet<KeyUsages>,
    pub ext_key_usage: Vec<ObjectIdentifier>,
    pub unknown: Vec<String>,
}

/// A named, declarative issuance policy
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CertProfile {
    /// Key-usage / extended-key-usage names, resolved via fixed tables
    #[serde(default)]
    pub usage: Vec<String>,
    #[serde(default)]
    pub ca_constraint: CaConstraint,
    #[serde(default)]
    pub ocsp_no_check: bool,

    #[serde(default)]
    pub expiry: Duration,
    #[serde(default)]
    pub backdate: Duration,

    /// Extension OIDs a request may attach explicitly
    #[serde(default)]
    pub allowed_extensions: Vec<String>,

    /// Allow-list patterns; empty string means unrestricted
    #[serde(default)]
    pub allowed_names: String,
    #[serde(default)]
    pub allowed_dns: String,
    #[serde(default)]
    pub allowed_email: String,
    #[serde(default)]
    pub allowed_uri: String,

    #[serde(default)]
    pub allowed_fields: CsrWhitelist,

    #[serde(default)]
    pub policies: Vec<CertificatePolicy>,

    /// Restricts this profile to one issuer label
    #[serde(default)]
    pub issuer_label: String,

    #[serde(default)]
    pub allowed_roles: Vec<String>,
    #[serde(default)]
    pub denied_roles: Vec<String>,

    // compiled once by validate(), never at signing time; crate
    // visibility so profiles remain constructible with record update
    // syntax outside this module
    #[serde(skip)]
    pub(crate) names_regex: Option<Regex>,
    #[serde(skip)]
    pub(crate) dns_regex: Option<Regex>,
    #[serde(skip)]
    pub(crate) email_regex: Option<Regex>,
    #[serde(skip)]
    pub(crate) uri_regex: Option<Regex>,
}

/// Default backdate applied when a profile leaves it unset
pub const DEFAULT_BACKDATE: Duration = Duration::from_secs(5 * 60);

fn key_usage_from_name(name: &str) -> Option<KeyUsages> {
    let usage = match name {
        "signing" | "digital signature" => KeyUsages::DigitalSignature,
        "content commitment" | "content committment" => KeyUsages::NonRepudiation,
        "key encipherment" => KeyUsages::KeyEncipherment,
        "data encipherment" => KeyUsages::DataEncipherment,
        "key agreement" => KeyUsages::KeyAgreement,
        "cert sign" => KeyUsages::KeyCertSign,
        "crl sign" => KeyUsages::CRLSign,
        "encipher only" => KeyUsages::EncipherOnly,
        "decipher only" => KeyUsages::DecipherOnly,
        _ => return None,
    };
    Some(usage)
}

fn ext_key_usage_from_name(name: &str) -> Option<ObjectIdentifier> {
    let oid = match name {
        "any" => oids::EKU_ANY,
        "server auth" => oids::EKU_SERVER_AUTH,
        "client auth" => oids::EKU_CLIENT_AUTH,
        "code signing" => oids::EKU_CODE_SIGNING,
        "email protection" | "s/mime" => oids::EKU_EMAIL_PROTECTION,
        "ipsec end system" => oids::EKU_IPSEC_END_SYSTEM,
        "ipsec tunnel" => oids::EKU_IPSEC_TUNNEL,
        "ipsec user" => oids::EKU_IPSEC_USER,
        "timestamping" => oids::EKU_TIMESTAMPING,
        "ocsp signing" => oids::EKU_OCSP_SIGNING,
        "microsoft sgc" => oids::EKU_MICROSOFT_SGC,
        "netscape sgc" => oids::EKU_NETSCAPE_SGC,
        _ => return None,
    };
    Some(oid)
}

impl CertProfile {
    /// The permissive fallback synthesized when no `default` profile is
    /// configured: signing + key encipherment, server/client auth, one
    /// year expiry.
    pub fn permissive_default() -> Self {
        CertProfile {
            usage: vec![
                "signing".to_string(),
                "key encipherment".to_string(),
                "server auth".to_string(),
                "client auth".to_string(),
            ],
            expiry: Duration::from_secs(365 * 24 * 3600),
            ..Default::default()
        }
    }

    /// Split the usage name list into a key-usage bitmask, extended
    /// key usage OIDs and the set of unrecognized names
    pub fn usages(&self) -> ResolvedUsage {
        let mut resolved = ResolvedUsage::default();
        for name in &self.usage {
            let name = name.to_ascii_lowercase();
            if let Some(usage) = key_usage_from_name(&name) {
                resolved.key_usage |= usage;
            } else if let Some(oid) = ext_key_usage_from_name(&name) {
                resolved.ext_key_usage.push(oid);
            } else {
                resolved.unknown.push(name);
            }
        }
        resolved
    }

    /// Validate the profile and cache its compiled regexes. Run once
    /// at configuration load; failures are fatal to startup and name
    /// the offending profile and field.
    pub fn validate(&mut self, name: &str) -> Result<()> {
        if self.expiry.is_zero() {
            return Err(PkiError::ConfigError(format!(
                "profile {name}: expiry must be set"
            )));
        }
        if self.usage.is_empty() {
            return Err(PkiError::ConfigError(format!(
                "profile {name}: no usages configured"
            )));
        }

        let resolved = self.usages();
        if !resolved.unknown.is_empty() {
            return Err(PkiError::ConfigError(format!(
                "profile {name}: unknown usage names: {}",
                resolved.unknown.join(", ")
            )));
        }
        if resolved.key_usage.is_empty() && resolved.ext_key_usage.is_empty() {
            return Err(PkiError::ConfigError(format!(
                "profile {name}: usage list resolves to nothing"
            )));
        }

        for extension in &self.allowed_extensions {
            ObjectIdentifier::new(extension).map_err(|e| {
                PkiError::ConfigError(format!(
                    "profile {name}: invalid allowed extension OID {extension}: {e}"
                ))
            })?;
        }

        for policy in &self.policies {
            ObjectIdentifier::new(&policy.id).map_err(|e| {
                PkiError::ConfigError(format!(
                    "profile {name}: invalid policy OID {}: {e}",
                    policy.id
                ))
            })?;
            for qualifier in &policy.qualifiers {
                qualifier.to_qualifier().map_err(|e| {
                    PkiError::ConfigError(format!("profile {name}: {e}"))
                })?;
            }
        }

        self.names_regex = compile(name, "allowed_names", &self.allowed_names)?;
        self.dns_regex = compile(name, "allowed_dns", &self.allowed_dns)?;
        self.email_regex = compile(name, "allowed_email", &self.allowed_email)?;
        self.uri_regex = compile(name, "allowed_uri", &self.allowed_uri)?;

        Ok(())
    }

    pub fn names_regex(&self) -> Option<&Regex> {
        self.names_regex.as_ref()
    }

    pub fn dns_regex(&self) -> Option<&Regex> {
        self.dns_regex.as_ref()
    }

    pub fn email_regex(&self) -> Option<&Regex> {
        self.email_regex.as_ref()
    }

    pub fn uri_regex(&self) -> Option<&Regex> {
        self.uri_regex.as_ref()
    }

    /// Backdate with the default applied
    pub fn backdate(&self) -> Duration {
        if self.backdate.is_zero() {
            DEFAULT_BACKDATE
        } else {
            self.backdate
        }
    }

    /// Role gating: deny wins over allow, `"*"` is a wildcard on both
    /// sides, and an empty allow list means unrestricted.
    pub fn is_allowed(&self, role: &str) -> bool {
        if self
            .denied_roles
            .iter()
            .any(|denied| denied == role || denied == "*")
        {
            return false;
        }
        if self.allowed_roles.is_empty() {
            return true;
        }
        self.allowed_roles
            .iter()
            .any(|allowed| allowed == role || allowed == "*")
    }

    /// Whether a request may attach an extension with this OID
    pub fn extension_allowed(&self, oid: &str) -> bool {
        self.allowed_extensions.iter().any(|allowed| allowed == oid)
    }
}

fn compile(profile: &str, field: &str, pattern: &str) -> Result<Option<Regex>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    let regex = Regex::new(pattern).map_err(|e| {
        PkiError::ConfigError(format!("profile {profile}: bad {field} regex: {e}"))
    })?;
    Ok(Some(regex))
}
