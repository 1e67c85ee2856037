//! Private certificate authority engine: issuer registry, declarative
//! signing profiles and the certificate signing pipeline.

pub mod bundle;
pub mod ca;
pub mod cert;
pub mod config;
pub mod csr;
pub mod error;
pub mod extensions;
pub mod profile;

pub use bundle::{Bundle, BundleIssue, BundleStatus, IssueLevel};
pub use ca::{new_root, Authority, DigestAlgorithm, Issuer, RootIssueResult, SignedCertificate};
pub use cert::{
    classify_san, generate_serial, CertificateRequest, CustomExtension, KeyRequest, SanEntry,
    SignRequest, Template, X509Name, X509Subject,
};
pub use config::{resolve_url, AiaConfig, CaConfig, IssuerConfig};
pub use csr::{create_csr, Csr};
pub use error::{PkiError, Result};
pub use profile::{
    CaConstraint, CertProfile, CertificatePolicy, CsrWhitelist, PolicyQualifier, ResolvedUsage,
};

/// The types most callers need
pub mod prelude {
    pub use crate::ca::{new_root, Authority, Issuer, SignedCertificate};
    pub use crate::cert::{CertificateRequest, SignRequest, X509Subject};
    pub use crate::config::{AiaConfig, CaConfig, IssuerConfig};
    pub use crate::error::{PkiError, Result};
    pub use crate::profile::CertProfile;
}
