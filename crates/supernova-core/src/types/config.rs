use serde::{Deserialize, Serialize};

/// Path of the device config endpoint, relative to the control endpoint
pub const DEVICE_CONFIG_PATH: &str = "/api/device/config";

/// Header carrying the device identity
pub const DEVICE_NAME_HEADER: &str = "X-Device-Name";

/// Body of a device config fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfigRequest {
    /// YAML fragment merged over the generated config by the control plane
    #[serde(rename = "configOverride")]
    pub config_override: String,
}

/// Answer to a device config fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfigResponse {
    /// Complete tunnel config, opaque to the daemon
    pub config: String,
}
