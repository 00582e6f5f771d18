use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::{Result, SupernovaError};

/// Attribute names used in the persisted device table
pub mod attr {
    /// Primary key
    pub const DEVICE_NAME: &str = "deviceName";
    /// Renewal watermark, unix seconds
    pub const RENEWABLE_AT: &str = "renewableAt";
    /// Last issued certificate
    pub const CRT: &str = "crt";
}

/// One row of the device table.
///
/// Items in the table are schemaless JSON objects; [`DeviceRecord::decode`]
/// is the only way in, so a bad item surfaces as
/// [`SupernovaError::MalformedRecord`] instead of a panic deep in a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Unique device name (table key)
    pub device_name: String,

    /// Device public key, opaque to us
    pub public_key: String,

    /// Nebula groups; stored as null when empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub groups: BTreeSet<String>,

    /// Tunnel address in CIDR form, e.g. `10.0.0.5/24`
    pub ip: String,

    /// Last issued certificate
    #[serde(default)]
    pub crt: String,

    /// Earliest unix time at which the certificate may be re-issued
    pub renewable_at: i64,
}

impl DeviceRecord {
    /// Decode a stored item, validating its shape.
    pub fn decode(item: &Value) -> Result<Self> {
        let device = item
            .get(attr::DEVICE_NAME)
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();

        if !item.is_object() {
            return Err(SupernovaError::malformed(device, "item is not an object"));
        }

        let record: Self = serde_json::from_value(item.clone())
            .map_err(|e| SupernovaError::malformed(&device, e.to_string()))?;

        if record.device_name.is_empty() {
            return Err(SupernovaError::malformed(device, "empty deviceName"));
        }

        Ok(record)
    }

    /// Encode into the stored item representation.
    pub fn to_item(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Whether the renewal watermark has passed at `now` (unix seconds)
    #[must_use]
    pub const fn is_due(&self, now: i64) -> bool {
        self.renewable_at < now
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}
