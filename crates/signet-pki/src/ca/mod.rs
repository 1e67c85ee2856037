//! Certificate authority core: the issuer registry, the signing
//! pipeline and root issuance.

pub mod authority;
pub mod issuer;
pub mod root;

pub use authority::Authority;
pub use issuer::{DigestAlgorithm, Issuer, ResponderHashes, SignedCertificate};
pub use root::{new_root, RootIssueResult};
