//! The issuer registry built from configuration at startup.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use signet_key::KeyProvider;

use crate::{
    bundle::Bundle,
    config::{CaConfig, IssuerConfig},
    error::{PkiError, Result},
};

use super::issuer::Issuer;

/// Immutable registry of issuers, keyed by label and by profile name.
/// Built once at startup; concurrent lookups need no locking.
pub struct Authority {
    by_label: HashMap<String, Arc<Issuer>>,
    by_profile: HashMap<String, Arc<Issuer>>,
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut labels: Vec<&str> = self.by_label.keys().map(String::as_str).collect();
        labels.sort_unstable();
        let mut profiles: Vec<&str> = self.by_profile.keys().map(String::as_str).collect();
        profiles.sort_unstable();
        f.debug_struct("Authority")
            .field("issuers", &labels)
            .field("profiles", &profiles)
            .finish()
    }
}

impl Authority {
    /// Construct every non-disabled issuer from configuration. Fails
    /// on unreadable material, untrusted chains, invalid profiles,
    /// duplicate profile names across issuers, or a profile whose
    /// `issuer_label` names an issuer that is not declared.
    ///
    /// Each issuer signs only under the profiles it declares; the
    /// `default` profile is not granted implicitly.
    pub fn new(mut config: CaConfig, provider: &dyn KeyProvider) -> Result<Authority> {
        config.ensure_default_profile();

        let declared_labels: Vec<String> =
            config.issuers.iter().map(|i| i.label.clone()).collect();
        for (name, profile) in config.profiles.iter_mut() {
            profile.validate(name)?;
            if !profile.issuer_label.is_empty()
                && !declared_labels.contains(&profile.issuer_label)
            {
                return Err(PkiError::ConfigError(format!(
                    "profile {name} names undeclared issuer {}",
                    profile.issuer_label
                )));
            }
        }

        let mut by_label = HashMap::new();
        let mut by_profile = HashMap::new();

        for issuer_config in &config.issuers {
            if issuer_config.disabled {
                info!(label = %issuer_config.label, "skipping disabled issuer");
                continue;
            }
            let issuer = Arc::new(build_issuer(issuer_config, &config, provider)?);

            if by_label
                .insert(issuer_config.label.clone(), Arc::clone(&issuer))
                .is_some()
            {
                return Err(PkiError::ConfigError(format!(
                    "duplicate issuer label {}",
                    issuer_config.label
                )));
            }
            for profile_name in &issuer_config.profiles {
                if by_profile
                    .insert(profile_name.clone(), Arc::clone(&issuer))
                    .is_some()
                {
                    return Err(PkiError::ConfigError(format!(
                        "profile {profile_name} is declared by more than one issuer"
                    )));
                }
            }
            info!(
                label = %issuer_config.label,
                profiles = issuer_config.profiles.len(),
                "registered issuer"
            );
        }

        Ok(Authority {
            by_label,
            by_profile,
        })
    }

    pub fn get_issuer_by_label(&self, label: &str) -> Result<Arc<Issuer>> {
        self.by_label
            .get(label)
            .cloned()
            .ok_or_else(|| PkiError::ConfigError(format!("no issuer with label {label}")))
    }

    pub fn get_issuer_by_profile(&self, profile: &str) -> Result<Arc<Issuer>> {
        self.by_profile
            .get(profile)
            .cloned()
            .ok_or_else(|| PkiError::UnsupportedProfile(profile.to_string()))
    }

    /// Every registered issuer, in no particular order
    pub fn issuers(&self) -> Vec<Arc<Issuer>> {
        self.by_label.values().cloned().collect()
    }
}

fn build_issuer(
    issuer_config: &IssuerConfig,
    config: &CaConfig,
    provider: &dyn KeyProvider,
) -> Result<Issuer> {
    let cert_pem = read_pem(&issuer_config.cert, "failed to load cert")?;
    let intermediates_pem = match &issuer_config.ca_bundle {
        Some(path) => Some(read_pem(path, "failed to load CA bundle")?),
        None => None,
    };
    let root_pem = match &issuer_config.root_bundle {
        Some(path) => Some(read_pem(path, "failed to load root bundle")?),
        None => None,
    };

    let bundle = Bundle::from_pem(
        &cert_pem,
        intermediates_pem.as_deref(),
        root_pem.as_deref(),
    )?;

    // a locator URI goes to the provider as-is, a path is read first
    let key_material = if issuer_config.key.contains("://") {
        issuer_config.key.clone()
    } else {
        read_pem(Path::new(&issuer_config.key), "failed to load key")?
    };
    let signer = provider
        .load_signer(&key_material)
        .map_err(|e| PkiError::ConfigError(format!("failed to load key: {e}")))?;

    let mut profiles = HashMap::new();
    for name in &issuer_config.profiles {
        let profile = config.profiles.get(name).ok_or_else(|| {
            PkiError::ConfigError(format!(
                "issuer {} declares unknown profile {name}",
                issuer_config.label
            ))
        })?;
        profiles.insert(name.clone(), profile.clone());
    }

    let aia = issuer_config.aia.merge(&config.default_aia);
    Issuer::new(&issuer_config.label, bundle, signer, profiles, aia)
}

fn read_pem(path: &Path, context: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| PkiError::ConfigError(format!("{context} {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use signet_key::{Algorithm, SoftwareProvider};

    use super::*;
    use crate::ca::root::new_root;
    use crate::cert::{CertificateRequest, SignRequest, X509Subject};
    use crate::csr::create_csr;
    use crate::profile::CertProfile;

    struct Fixture {
        provider: SoftwareProvider,
        dir: tempfile::TempDir,
        cert_path: std::path::PathBuf,
        key_locator: String,
    }

    fn fixture() -> Fixture {
        let provider = SoftwareProvider::new();
        let request = CertificateRequest {
            common_name: "Fixture Root CA".to_string(),
            ..Default::default()
        };
        let root = new_root(&request, CaConfig::default(), &provider).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("ca.pem");
        std::fs::write(&cert_path, &root.cert_pem).unwrap();

        Fixture {
            provider,
            dir,
            cert_path,
            key_locator: root.key.locator,
        }
    }

    fn server_profile() -> CertProfile {
        CertProfile {
            usage: vec!["signing".to_string(), "server auth".to_string()],
            expiry: Duration::from_secs(365 * 24 * 3600),
            ..Default::default()
        }
    }

    fn issuer_config(fixture: &Fixture, label: &str, profiles: &[&str]) -> IssuerConfig {
        IssuerConfig {
            label: label.to_string(),
            cert: fixture.cert_path.clone(),
            key: fixture.key_locator.clone(),
            profiles: profiles.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_authority_registers_by_label_and_profile() {
        let fixture = fixture();
        let mut config = CaConfig::default();
        config.profiles.insert("server".to_string(), server_profile());
        config.issuers.push(issuer_config(&fixture, "primary", &["server"]));

        let authority = Authority::new(config, &fixture.provider).unwrap();
        assert_eq!(authority.issuers().len(), 1);
        let by_label = authority.get_issuer_by_label("primary").unwrap();
        let by_profile = authority.get_issuer_by_profile("server").unwrap();
        assert_eq!(by_label.label(), by_profile.label());
        assert!(authority.get_issuer_by_label("other").is_err());
        assert!(matches!(
            authority.get_issuer_by_profile("unknown").unwrap_err(),
            PkiError::UnsupportedProfile(_)
        ));
    }

    #[test]
    fn test_issuer_signs_only_declared_profiles() {
        let fixture = fixture();
        let mut config = CaConfig::default();
        config.profiles.insert("server".to_string(), server_profile());
        config.issuers.push(issuer_config(&fixture, "primary", &["server"]));

        let authority = Authority::new(config, &fixture.provider).unwrap();
        let issuer = authority.get_issuer_by_label("primary").unwrap();

        let handle = fixture.provider.generate_key("leaf", Algorithm::Ed25519).unwrap();
        let signer = fixture.provider.signer(handle).unwrap();
        let csr = create_csr(
            signer.as_ref(),
            &X509Subject {
                common_name: "leaf.example.com".to_string(),
                ..Default::default()
            },
            &[],
        )
        .unwrap();

        let request = SignRequest {
            hosts: vec!["leaf.example.com".to_string()],
            csr: csr.to_pem().unwrap(),
            profile: "server".to_string(),
            ..Default::default()
        };
        assert!(issuer.sign(&request).is_ok());

        // an empty profile resolves to "default", which this issuer
        // never declared
        let request = SignRequest {
            hosts: vec!["leaf.example.com".to_string()],
            csr: csr.to_pem().unwrap(),
            ..Default::default()
        };
        assert!(matches!(
            issuer.sign(&request).unwrap_err(),
            PkiError::UnsupportedProfile(_)
        ));
    }

    #[test]
    fn test_authority_skips_disabled_issuers() {
        let fixture = fixture();
        let mut config = CaConfig::default();
        config.profiles.insert("server".to_string(), server_profile());
        let mut disabled = issuer_config(&fixture, "dormant", &["server"]);
        disabled.disabled = true;
        config.issuers.push(disabled);

        let authority = Authority::new(config, &fixture.provider).unwrap();
        assert!(authority.issuers().is_empty());
    }

    #[test]
    fn test_authority_rejects_duplicate_profile_claims() {
        let fixture = fixture();
        let mut config = CaConfig::default();
        config.profiles.insert("server".to_string(), server_profile());
        config.issuers.push(issuer_config(&fixture, "first", &["server"]));
        config.issuers.push(issuer_config(&fixture, "second", &["server"]));

        let err = Authority::new(config, &fixture.provider).unwrap_err();
        assert!(matches!(err, PkiError::ConfigError(_)));
    }

    #[test]
    fn test_authority_rejects_undeclared_issuer_label() {
        let fixture = fixture();
        let mut config = CaConfig::default();
        let mut profile = server_profile();
        profile.issuer_label = "ghost".to_string();
        config.profiles.insert("server".to_string(), profile);
        config.issuers.push(issuer_config(&fixture, "primary", &["server"]));

        let err = Authority::new(config, &fixture.provider).unwrap_err();
        assert!(matches!(err, PkiError::ConfigError(_)));
    }

    #[test]
    fn test_authority_fails_on_missing_cert_file() {
        let fixture = fixture();
        let mut config = CaConfig::default();
        config.profiles.insert("server".to_string(), server_profile());
        let mut broken = issuer_config(&fixture, "primary", &["server"]);
        broken.cert = fixture.dir.path().join("missing.pem");
        config.issuers.push(broken);

        let err = Authority::new(config, &fixture.provider).unwrap_err();
        assert!(err.to_string().contains("failed to load cert"));
    }
}
