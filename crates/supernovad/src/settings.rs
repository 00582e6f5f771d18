//! Daemon settings from the environment.
//!
//! Every value can be given directly (`NAME`) or through a file
//! (`NAME_FILE`), which is how container secrets usually arrive.

use base64::Engine;
use std::fmt;
use std::path::{Path, PathBuf};
use supernova_core::{Result, SupernovaError};
use tracing::info;

/// Tunnel executable
pub const ENV_NEBULA_EXECUTABLE: &str = "NEBULA_EXECUTABLE";
/// Control endpoint base URL
pub const ENV_DASH_ENDPOINT: &str = "DASH_ENDPOINT";
/// Device identity
pub const ENV_DEVICE_NAME: &str = "DEVICE_NAME";
/// Device credential
pub const ENV_DEVICE_TOKEN: &str = "DEVICE_TOKEN";
/// Optional YAML override sent with every fetch
pub const ENV_CONFIG_OVERRIDE: &str = "CONFIG_OVERRIDE";
/// Optional base64 host key written before the tunnel starts
pub const ENV_HOST_KEY_B64: &str = "HOST_KEY_B64";
/// Where the host key goes
pub const ENV_HOST_KEY_PATH: &str = "HOST_KEY_PATH";

const DEFAULT_HOST_KEY_PATH: &str = "/tmp/host.key";

/// Validated daemon settings
#[derive(Clone)]
pub struct Settings {
    /// Tunnel executable, started as `<exe> -config <file>`
    pub nebula_executable: PathBuf,
    /// Control endpoint base URL
    pub dash_endpoint: String,
    /// Device name sent in the identity header
    pub device_name: String,
    /// Bearer credential
    pub device_token: String,
    /// Override sent in every fetch body; empty when unset
    pub config_override: String,
    /// Decoded host key, if one was supplied
    pub host_key: Option<Vec<u8>>,
    /// Destination of the host key
    pub host_key_path: PathBuf,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("nebula_executable", &self.nebula_executable)
            .field("dash_endpoint", &self.dash_endpoint)
            .field("device_name", &self.device_name)
            .field("device_token", &"<redacted>")
            .field("config_override", &self.config_override)
            .field("host_key", &self.host_key.as_ref().map(|_| "<redacted>"))
            .field("host_key_path", &self.host_key_path)
            .finish()
    }
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through `lookup`; missing required values are fatal.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nebula_executable = PathBuf::from(require(&lookup, ENV_NEBULA_EXECUTABLE)?);
        let dash_endpoint = require(&lookup, ENV_DASH_ENDPOINT)?;
        let device_name = require(&lookup, ENV_DEVICE_NAME)?;
        let device_token = require(&lookup, ENV_DEVICE_TOKEN)?;

        // The override is YAML; keep its whitespace.
        let config_override = read_var_or_file(&lookup, ENV_CONFIG_OVERRIDE)?.unwrap_or_default();

        let host_key = read_var_or_file(&lookup, ENV_HOST_KEY_B64)?
            .map(|encoded| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| SupernovaError::Config(format!("error decoding {ENV_HOST_KEY_B64}: {e}")))
            })
            .transpose()?;

        let host_key_path = read_var_or_file(&lookup, ENV_HOST_KEY_PATH)?
            .map_or_else(|| PathBuf::from(DEFAULT_HOST_KEY_PATH), |p| PathBuf::from(p.trim()));

        Ok(Self {
            nebula_executable,
            dash_endpoint,
            device_name,
            device_token,
            config_override,
            host_key,
            host_key_path,
        })
    }

    /// Write the host key with owner-only permissions, if one was supplied.
    pub fn write_host_key(&self) -> Result<Option<&Path>> {
        let Some(key) = &self.host_key else {
            return Ok(None);
        };
        write_private(&self.host_key_path, key)?;
        info!(path = %self.host_key_path.display(), "wrote host key");
        Ok(Some(&self.host_key_path))
    }
}

/// `NAME` if set and non-empty, else the contents of the file named by
/// `NAME_FILE`, else `None`.
fn read_var_or_file<F>(lookup: &F, name: &str) -> Result<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
        return Ok(Some(value));
    }

    let Some(file) = lookup(&format!("{name}_FILE")).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    std::fs::read_to_string(&file)
        .map(Some)
        .map_err(|e| SupernovaError::Config(format!("error reading file {file} for {name}: {e}")))
}

/// Required single-line value; a trailing newline from a secret file is dropped.
fn require<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    read_var_or_file(lookup, name)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            SupernovaError::Config(format!("environment variable {name} or {name}_FILE not set"))
        })
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn required() -> Vec<(&'static str, String)> {
        vec![
            (ENV_NEBULA_EXECUTABLE, "/usr/local/bin/nebula".into()),
            (ENV_DASH_ENDPOINT, "https://dash.example.com".into()),
            (ENV_DEVICE_NAME, "node1".into()),
            (ENV_DEVICE_TOKEN, "secret".into()),
        ]
    }

    #[test]
    fn test_direct_values() {
        let settings = Settings::from_lookup(env(&required())).unwrap();
        assert_eq!(settings.nebula_executable, PathBuf::from("/usr/local/bin/nebula"));
        assert_eq!(settings.dash_endpoint, "https://dash.example.com");
        assert_eq!(settings.device_name, "node1");
        assert!(settings.config_override.is_empty());
        assert!(settings.host_key.is_none());
        assert_eq!(settings.host_key_path, PathBuf::from("/tmp/host.key"));
    }

    #[test]
    fn test_file_indirection() {
        let dir = TempDir::new().unwrap();
        let token = dir.path().join("token");
        let overrides = dir.path().join("override.yaml");
        std::fs::write(&token, "from-file\n").unwrap();
        std::fs::write(&overrides, "tun:\n  mtu: 1400\n").unwrap();

        let mut vars = required();
        vars.retain(|(k, _)| *k != ENV_DEVICE_TOKEN);
        vars.push(("DEVICE_TOKEN_FILE", token.display().to_string()));
        vars.push(("CONFIG_OVERRIDE_FILE", overrides.display().to_string()));

        let settings = Settings::from_lookup(env(&vars)).unwrap();
        assert_eq!(settings.device_token, "from-file");
        assert_eq!(settings.config_override, "tun:\n  mtu: 1400\n");
    }

    #[test]
    fn test_direct_value_wins_over_file() {
        let mut vars = required();
        vars.push(("DEVICE_NAME_FILE", "/nonexistent".into()));
        let settings = Settings::from_lookup(env(&vars)).unwrap();
        assert_eq!(settings.device_name, "node1");
    }

    #[test]
    fn test_missing_required_is_fatal() {
        for missing in [ENV_NEBULA_EXECUTABLE, ENV_DASH_ENDPOINT, ENV_DEVICE_NAME, ENV_DEVICE_TOKEN] {
            let mut vars = required();
            vars.retain(|(k, _)| *k != missing);
            match Settings::from_lookup(env(&vars)) {
                Err(SupernovaError::Config(msg)) => assert!(msg.contains(missing)),
                other => panic!("expected config error for {missing}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unreadable_file_is_fatal() {
        let mut vars = required();
        vars.retain(|(k, _)| *k != ENV_DEVICE_TOKEN);
        vars.push(("DEVICE_TOKEN_FILE", "/nonexistent/token".into()));
        assert!(matches!(
            Settings::from_lookup(env(&vars)),
            Err(SupernovaError::Config(_))
        ));
    }

    #[test]
    fn test_host_key_written_private() {
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join("host.key");

        let mut vars = required();
        vars.push((ENV_HOST_KEY_B64, "SE9TVEtFWQ==".into()));
        vars.push((ENV_HOST_KEY_PATH, key_path.display().to_string()));

        let settings = Settings::from_lookup(env(&vars)).unwrap();
        assert_eq!(settings.write_host_key().unwrap(), Some(key_path.as_path()));
        assert_eq!(std::fs::read(&key_path).unwrap(), b"HOSTKEY");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_bad_host_key_is_fatal() {
        let mut vars = required();
        vars.push((ENV_HOST_KEY_B64, "not base64!".into()));
        assert!(Settings::from_lookup(env(&vars)).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let settings = Settings::from_lookup(env(&required())).unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("node1"));
    }
}
