//! In-memory configuration for the CA core.
//!
//! Parsing of the on-disk configuration format is out of scope; the
//! loader hands this module already-deserialized structures. The types
//! here still carry the merge and defaulting semantics: per-issuer AIA
//! blocks inherit unset fields from the global default, zero durations
//! fall back to documented hard defaults, and a missing `default`
//! profile is synthesized.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::profile::CertProfile;

/// Placeholder substituted with the issuer's subject id in URL templates
pub const ISSUER_ID_PLACEHOLDER: &str = "${ISSUER_ID}";

/// Hard default for CRL renewal when the configured value is zero
pub const DEFAULT_CRL_RENEWAL: Duration = Duration::from_secs(7 * 24 * 3600);
/// Hard default for CRL expiry when the configured value is zero
pub const DEFAULT_CRL_EXPIRY: Duration = Duration::from_secs(30 * 24 * 3600);
/// Hard default for OCSP response expiry when the configured value is zero
pub const DEFAULT_OCSP_EXPIRY: Duration = Duration::from_secs(24 * 3600);

/// AIA/OCSP/CRL URL templates and the durations attached to them.
///
/// URL templates may contain [`ISSUER_ID_PLACEHOLDER`], replaced with
/// the issuer bundle's subject id once the issuer is constructed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AiaConfig {
    /// CA-issuers URL template (AIA caIssuers access method)
    #[serde(default)]
    pub aia_url: String,
    /// OCSP responder URL template
    #[serde(default)]
    pub ocsp_url: String,
    /// CRL distribution point URL template
    #[serde(default)]
    pub crl_url: String,

    #[serde(default)]
    pub crl_expiry: Duration,
    #[serde(default)]
    pub crl_renewal: Duration,
    #[serde(default)]
    pub ocsp_expiry: Duration,
}

impl AiaConfig {
    /// Merge with the authority-wide default block, field by field.
    /// A field from `self` wins only when it is non-empty/non-zero.
    pub fn merge(&self, default: &AiaConfig) -> AiaConfig {
        AiaConfig {
            aia_url: pick_str(&self.aia_url, &default.aia_url),
            ocsp_url: pick_str(&self.ocsp_url, &default.ocsp_url),
            crl_url: pick_str(&self.crl_url, &default.crl_url),
            crl_expiry: pick_duration(self.crl_expiry, default.crl_expiry),
            crl_renewal: pick_duration(self.crl_renewal, default.crl_renewal),
            ocsp_expiry: pick_duration(self.ocsp_expiry, default.ocsp_expiry),
        }
    }

    /// CRL expiry with the hard default applied
    pub fn crl_expiry(&self) -> Duration {
        pick_duration(self.crl_expiry, DEFAULT_CRL_EXPIRY)
    }

    /// CRL renewal with the hard default applied
    pub fn crl_renewal(&self) -> Duration {
        pick_duration(self.crl_renewal, DEFAULT_CRL_RENEWAL)
    }

    /// OCSP expiry with the hard default applied
    pub fn ocsp_expiry(&self) -> Duration {
        pick_duration(self.ocsp_expiry, DEFAULT_OCSP_EXPIRY)
    }
}

fn pick_str(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn pick_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

/// Substitute the `${ISSUER_ID}` placeholder in a URL template
pub fn resolve_url(template: &str, issuer_id: &str) -> String {
    template.replace(ISSUER_ID_PLACEHOLDER, issuer_id)
}

/// One signing identity as declared in configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Unique registry key
    pub label: String,
    /// Disabled issuers are skipped during Authority construction
    #[serde(default)]
    pub disabled: bool,

    /// Path to the issuer's own certificate (PEM)
    #[serde(default)]
    pub cert: PathBuf,
    /// Path or locator for the private key
    #[serde(default)]
    pub key: String,
    /// Path to the intermediate bundle (PEM), optional
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,
    /// Path to the root bundle (PEM), optional
    #[serde(default)]
    pub root_bundle: Option<PathBuf>,

    #[serde(default)]
    pub aia: AiaConfig,

    /// Names of the profiles this issuer may sign under
    #[serde(default)]
    pub profiles: Vec<String>,
}

/// Full authority configuration handed to [`crate::ca::Authority::new`]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CaConfig {
    /// Default AIA block inherited by every issuer
    #[serde(default)]
    pub default_aia: AiaConfig,
    #[serde(default)]
    pub issuers: Vec<IssuerConfig>,
    /// Profiles keyed by name
    #[serde(default)]
    pub profiles: HashMap<String, CertProfile>,
}

impl CaConfig {
    /// Ensure a `default` profile exists, synthesizing the permissive
    /// fallback (signing + key encipherment, server/client auth, one
    /// year) when the configuration does not declare one.
    pub fn ensure_default_profile(&mut self) {
        self.profiles
            .entry("default".to_string())
            .or_insert_with(CertProfile::permissive_default);
    }
}
