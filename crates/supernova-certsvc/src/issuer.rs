//! Certificate issuance with a renewal watermark.
//!
//! A certificate is signed for `ttl + grace` but declared renewable after
//! `ttl` only. The gap keeps a node connected through clock drift and a few
//! failed renewal sweeps.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use supernova_core::{CertificateRequest, CertificateResponse, Result, SupernovaError};
use tracing::info;

use crate::signer::{Signer, SigningRequest};

/// Renewal interval applied when a request does not ask for one (1 day).
pub const CERT_TTL_SECS: u64 = 86_400;

/// Validity added on top of the renewal interval (2 days).
pub const CERT_GRACE_PERIOD_SECS: u64 = 2 * 86_400;

/// Issues certificates through a [`Signer`].
#[derive(Clone)]
pub struct CertificateIssuer {
    signer: Arc<dyn Signer>,
}

impl CertificateIssuer {
    /// Create an issuer backed by `signer`
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }

    /// Sign a certificate and compute its renewal watermark.
    ///
    /// Nothing is retried here; sweep-level retry happens on the next run.
    pub async fn issue(&self, request: &CertificateRequest) -> Result<CertificateResponse> {
        validate(request)?;

        let ttl_secs = effective_ttl(request.duration_secs);
        let ttl = i64::try_from(ttl_secs)
            .map_err(|_| SupernovaError::InvalidRequest(format!("duration_secs {ttl_secs} too large")))?;
        let validity_secs = ttl_secs
            .checked_add(CERT_GRACE_PERIOD_SECS)
            .ok_or_else(|| SupernovaError::InvalidRequest(format!("duration_secs {ttl_secs} too large")))?;

        let crt = self
            .signer
            .sign(&SigningRequest {
                name: &request.name,
                ip: &request.ip,
                groups: &request.groups,
                public_key: &request.public_key,
                validity: Duration::from_secs(validity_secs),
            })
            .await?;

        let renewable_at = Utc::now()
            .timestamp()
            .checked_add(ttl)
            .ok_or_else(|| SupernovaError::InvalidRequest(format!("duration_secs {ttl_secs} too large")))?;

        info!(device = %request.name, renewable_at, "issued certificate");

        Ok(CertificateResponse { crt, renewable_at })
    }
}

/// Requested duration, or the default TTL when zero/absent
#[must_use]
pub const fn effective_ttl(duration_secs: Option<u64>) -> u64 {
    match duration_secs {
        None | Some(0) => CERT_TTL_SECS,
        Some(secs) => secs,
    }
}

fn validate(request: &CertificateRequest) -> Result<()> {
    if request.public_key.trim().is_empty() {
        return Err(SupernovaError::InvalidPublicKey(format!(
            "empty public key for {}",
            request.name
        )));
    }
    if request.name.trim().is_empty() {
        return Err(SupernovaError::InvalidRequest("name is required".into()));
    }
    if request.ip.trim().is_empty() {
        return Err(SupernovaError::InvalidRequest(format!(
            "ip is required for {}",
            request.name
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every validity it was asked for; fails for listed names.
    /// Certificates read `<label>CRT[<name>]`.
    #[derive(Default)]
    pub struct RecordingSigner {
        pub validities: Mutex<Vec<Duration>>,
        pub failing: HashSet<String>,
        pub label: String,
    }

    impl RecordingSigner {
        pub fn failing_for(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|n| (*n).to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn labelled(label: &str) -> Self {
            Self {
                label: label.to_string(),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.validities.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Signer for RecordingSigner {
        async fn sign(&self, request: &SigningRequest<'_>) -> Result<String> {
            self.validities.lock().unwrap().push(request.validity);
            if self.failing.contains(request.name) {
                return Err(SupernovaError::Signer {
                    message: "exit status: 1".into(),
                    output: "error: refused".into(),
                });
            }
            Ok(format!("{}CRT[{}]", self.label, request.name))
        }
    }
}
