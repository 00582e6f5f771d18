//! Certificate service configuration.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use supernova_core::{Result, SupernovaError};
use tracing::info;

use crate::controller::DEFAULT_RENEW_CONCURRENCY;

/// Environment variable overriding [`CertsvcConfig::nebula_cert`]
pub const ENV_NEBULA_CERT: &str = "NEBULA_CERT";
/// Environment variable overriding [`CertsvcConfig::store_path`]
pub const ENV_DEVICES_STORE: &str = "DEVICES_STORE";
/// Base64 CA certificate, written to [`CertsvcConfig::ca_crt`] at startup
pub const ENV_CA_CRT_B64: &str = "NEBULA_CA_CRT_B64";
/// Base64 CA key, written to [`CertsvcConfig::ca_key`] at startup
pub const ENV_CA_KEY_B64: &str = "NEBULA_CA_KEY_B64";

/// Configuration for the certificate service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertsvcConfig {
    /// Path to the `nebula-cert` executable.
    #[serde(default = "default_nebula_cert")]
    pub nebula_cert: PathBuf,

    /// CA certificate used for signing.
    #[serde(default = "default_ca_crt")]
    pub ca_crt: PathBuf,

    /// CA private key used for signing.
    #[serde(default = "default_ca_key")]
    pub ca_key: PathBuf,

    /// JSON device table.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Records renewed in parallel during a sweep.
    #[serde(default = "default_renew_concurrency")]
    pub renew_concurrency: usize,
}

impl Default for CertsvcConfig {
    fn default() -> Self {
        Self {
            nebula_cert: default_nebula_cert(),
            ca_crt: default_ca_crt(),
            ca_key: default_ca_key(),
            store_path: default_store_path(),
            renew_concurrency: default_renew_concurrency(),
        }
    }
}

impl CertsvcConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| SupernovaError::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides and materialize CA files supplied as
    /// base64. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(path) = lookup(ENV_NEBULA_CERT) {
            self.nebula_cert = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_DEVICES_STORE) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(encoded) = lookup(ENV_CA_CRT_B64) {
            write_ca_file(ENV_CA_CRT_B64, &encoded, &self.ca_crt, false)?;
        }
        if let Some(encoded) = lookup(ENV_CA_KEY_B64) {
            write_ca_file(ENV_CA_KEY_B64, &encoded, &self.ca_key, true)?;
        }
        Ok(())
    }

    /// Fail fast when signing could never work.
    pub fn validate(&self) -> Result<()> {
        if !self.nebula_cert.is_file() {
            return Err(SupernovaError::Config(format!(
                "nebula-cert executable not found at {}",
                self.nebula_cert.display()
            )));
        }
        for (what, path) in [("CA certificate", &self.ca_crt), ("CA key", &self.ca_key)] {
            if !path.is_file() {
                return Err(SupernovaError::Config(format!(
                    "{what} not found at {} (set {} / {})",
                    path.display(),
                    ENV_CA_CRT_B64,
                    ENV_CA_KEY_B64
                )));
            }
        }
        if self.renew_concurrency == 0 {
            return Err(SupernovaError::Config("renew_concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

fn write_ca_file(var: &str, encoded: &str, path: &Path, private: bool) -> Result<()> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| SupernovaError::Config(format!("error decoding {var}: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_file(path, &bytes, private)?;
    info!(path = %path.display(), "wrote CA material from {var}");
    Ok(())
}

#[cfg(unix)]
fn write_file(path: &Path, bytes: &[u8], private: bool) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mode = if private { 0o600 } else { 0o644 };
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_file(path: &Path, bytes: &[u8], _private: bool) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

// Default value functions for serde.
fn default_nebula_cert() -> PathBuf {
    PathBuf::from("./nebula-cert")
}

fn default_ca_crt() -> PathBuf {
    PathBuf::from("/tmp/ca.crt")
}

fn default_ca_key() -> PathBuf {
    PathBuf::from("/tmp/ca.key")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("devices.json")
}

const fn default_renew_concurrency() -> usize {
    DEFAULT_RENEW_CONCURRENCY
}
