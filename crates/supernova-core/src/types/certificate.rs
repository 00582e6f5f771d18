use serde::{Deserialize, Serialize};

use crate::DeviceRecord;

/// Envelope carrying only the action discriminator of an entry-point request
#[derive(Debug, Clone, Deserialize)]
pub struct ActionEnvelope {
    /// `sign` or `periodic_renew`
    pub action: String,
}

/// Payload of a `sign` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    /// Device public key
    pub public_key: String,

    /// Certificate subject name
    pub name: String,

    /// Nebula groups baked into the certificate
    #[serde(default)]
    pub groups: Vec<String>,

    /// Tunnel address in CIDR form
    pub ip: String,

    /// Requested lifetime before renewal; zero or absent means the default TTL
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

impl From<&DeviceRecord> for CertificateRequest {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            public_key: record.public_key.clone(),
            name: record.device_name.clone(),
            groups: record.groups.iter().cloned().collect(),
            ip: record.ip.clone(),
            duration_secs: None,
        }
    }
}

/// Result of a `sign` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateResponse {
    /// Signed certificate text
    pub crt: String,

    /// Unix time after which the certificate becomes due for renewal
    pub renewable_at: i64,
}

/// Result of a `periodic_renew` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicRenewResponse {
    /// Number of records renewed by the sweep
    pub count: u64,
}
