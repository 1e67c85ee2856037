//! Key provider boundary for the signet CA engine.
//!
//! The PKI core never touches raw private keys; it works through the
//! [`KeyProvider`] and [`Signer`] capability traits defined here. The
//! bundled [`SoftwareProvider`] keeps exportable keys in memory;
//! HSM-style backends implement the same traits with non-exportable
//! key material behind a locator URI.

pub mod error;
pub mod provider;
pub mod software;
pub mod types;
pub mod verify;

pub use error::{KeyError, Result};
pub use provider::{KeyProvider, Signer};
pub use software::{SoftwareProvider, SoftwareSigner};
pub use types::{Algorithm, KeyExport, KeyHandle, KeyInfo};
pub use verify::verify_with_spki;
