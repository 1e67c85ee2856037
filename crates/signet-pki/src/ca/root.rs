//! Root / self-signed issuance: generate a key, wrap it in a
//! parentless issuer and let the certificate sign itself.

use std::collections::HashMap;
use std::time::Duration;

use tracing::info;

use signet_key::{Algorithm, KeyExport, KeyProvider};

use crate::{
    cert::{CertificateRequest, SignRequest, X509Subject},
    config::CaConfig,
    csr::create_csr,
    error::{PkiError, Result},
    profile::{CaConstraint, CertProfile},
};

use super::issuer::Issuer;

/// Profile name the self-sign flow signs under
const ROOT_PROFILE: &str = "root";

/// Everything produced by root issuance: the self-signed certificate,
/// the CSR it was derived from, and the key material (raw PEM when
/// exportable, otherwise only a locator)
#[derive(Clone, Debug)]
pub struct RootIssueResult {
    pub cert_pem: String,
    pub csr_pem: String,
    pub key: KeyExport,
}

/// The CA-shaped profile used when the configuration does not declare
/// a `root` profile: cert/CRL signing, no path length limit, five
/// years.
fn default_root_profile() -> CertProfile {
    CertProfile {
        usage: vec!["cert sign".to_string(), "crl sign".to_string()],
        ca_constraint: CaConstraint {
            is_ca: true,
            max_path_len: -1,
        },
        expiry: Duration::from_secs(5 * 365 * 24 * 3600),
        ..Default::default()
    }
}

/// Issue a new self-signed root certificate. Generates a fresh key
/// through the provider, builds a CSR and a parentless issuer around
/// it, and signs the request against a CA-shaped profile (the
/// configured `root` profile when one exists).
pub fn new_root(
    request: &CertificateRequest,
    mut config: CaConfig,
    provider: &dyn KeyProvider,
) -> Result<RootIssueResult> {
    if request.common_name.is_empty() {
        return Err(PkiError::InvalidRequest(
            "root request needs a common name".to_string(),
        ));
    }
    let algorithm = Algorithm::from_request(&request.key.algorithm, request.key.size)
        .ok_or_else(|| {
            PkiError::InvalidRequest(format!(
                "unsupported key request: {} {}",
                request.key.algorithm, request.key.size
            ))
        })?;

    config.ensure_default_profile();
    for (name, profile) in config.profiles.iter_mut() {
        profile.validate(name)?;
    }
    let mut root_profile = config
        .profiles
        .get(ROOT_PROFILE)
        .cloned()
        .unwrap_or_else(default_root_profile);
    root_profile.validate(ROOT_PROFILE)?;
    if !root_profile.ca_constraint.is_ca {
        return Err(PkiError::ConfigError(
            "root profile must carry a CA constraint".to_string(),
        ));
    }

    let label = if request.key.label.is_empty() {
        request.common_name.as_str()
    } else {
        request.key.label.as_str()
    };
    let handle = provider.generate_key(label, algorithm)?;
    let key_info = provider.identify_key(handle)?;
    let signer = provider.signer(handle)?;

    let subject = X509Subject {
        common_name: request.common_name.clone(),
        names: request.names.clone(),
        serial_number: String::new(),
    };
    let csr = create_csr(signer.as_ref(), &subject, &request.hosts)?;
    let csr_pem = csr.to_pem()?;

    // the parentless issuer may only sign under the profiles the
    // supplied configuration declares, plus the root profile itself
    let mut profiles: HashMap<String, CertProfile> = config.profiles.clone();
    profiles.insert(ROOT_PROFILE.to_string(), root_profile);
    let issuer = Issuer::parentless(label, signer, profiles);

    let signed = issuer.sign(&SignRequest {
        hosts: request.hosts.clone(),
        csr: csr_pem.clone(),
        subject: None,
        profile: ROOT_PROFILE.to_string(),
        ..Default::default()
    })?;

    let key = provider.export_key(&key_info.id)?;
    info!(common_name = %request.common_name, %algorithm, "issued root certificate");

    Ok(RootIssueResult {
        cert_pem: signed.pem,
        csr_pem,
        key,
    })
}
