//! # supernova-certsvc
//!
//! Issues Nebula certificates for supernova devices and renews them in bulk.
//!
//! ## Renewal model
//!
//! ```text
//!   issue:   signed validity = ttl + grace      renewableAt = now + ttl
//!   sweep:   scan renewableAt < now  ->  re-issue  ->  CAS on renewableAt
//! ```
//!
//! Every device record carries a `renewableAt` watermark. A sweep picks up
//! records whose watermark has passed, re-signs them with the default TTL and
//! writes the result back only if the watermark is still the one it read.
//! Sweeps can overlap freely; a lost race is retried on the next run.
//!
//! The signer (`nebula-cert`) and the table storage are behind the
//! [`signer::Signer`] and [`store::RenewalStore`] traits.

pub mod cli;
pub mod config;
pub mod controller;
pub mod handler;
pub mod issuer;
pub mod signer;
pub mod store;

pub use config::CertsvcConfig;
pub use controller::RenewalController;
pub use handler::{Handler, Response};
pub use issuer::{CertificateIssuer, CERT_GRACE_PERIOD_SECS, CERT_TTL_SECS};
pub use signer::{NebulaCertSigner, Signer, SigningRequest};
pub use store::{FileStore, MemoryStore, RenewalStore, UpdateOutcome};
pub use supernova_core::{Result, SupernovaError};
