//! Request entry point: `sign` and `periodic_renew`.

use serde::Serialize;
use supernova_core::{
    ActionEnvelope, CertificateRequest, CertificateResponse, PeriodicRenewResponse, Result,
    SupernovaError,
};
use tracing::debug;

use crate::controller::RenewalController;
use crate::issuer::CertificateIssuer;

/// Reply to an entry-point request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// Reply to `sign`
    Sign(CertificateResponse),
    /// Reply to `periodic_renew`
    PeriodicRenew(PeriodicRenewResponse),
}

/// Dispatches JSON requests to the issuer or the renewal controller.
#[derive(Clone)]
pub struct Handler {
    issuer: CertificateIssuer,
    controller: RenewalController,
}

impl Handler {
    /// Create a handler
    pub const fn new(issuer: CertificateIssuer, controller: RenewalController) -> Self {
        Self { issuer, controller }
    }

    /// Handle one raw JSON request.
    ///
    /// The envelope is decoded first so an unknown action is reported as
    /// such rather than as a payload error.
    pub async fn handle(&self, raw: &str) -> Result<Response> {
        let envelope: ActionEnvelope = serde_json::from_str(raw)
            .map_err(|e| SupernovaError::InvalidRequest(format!("malformed envelope: {e}")))?;
        debug!(action = %envelope.action, "handling request");

        match envelope.action.as_str() {
            "sign" => {
                let request: CertificateRequest = serde_json::from_str(raw)
                    .map_err(|e| SupernovaError::InvalidRequest(format!("malformed sign request: {e}")))?;
                Ok(Response::Sign(self.issuer.issue(&request).await?))
            }
            "periodic_renew" => {
                let count = self.controller.run_sweep().await?;
                Ok(Response::PeriodicRenew(PeriodicRenewResponse { count }))
            }
            other => Err(SupernovaError::InvalidAction(other.to_string())),
        }
    }
}
