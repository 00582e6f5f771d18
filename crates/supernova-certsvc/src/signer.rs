//! External certificate signer.
//!
//! The CA primitive is `nebula-cert sign`, run as a black box. Key material
//! handed to it lives in a scratch directory that is removed when the call
//! returns, successful or not.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use supernova_core::{Result, SupernovaError};
use tokio::process::Command;
use tracing::debug;

/// Everything the signer needs to produce one certificate.
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    /// Certificate subject name
    pub name: &'a str,
    /// Tunnel address in CIDR form
    pub ip: &'a str,
    /// Nebula groups
    pub groups: &'a [String],
    /// Device public key
    pub public_key: &'a str,
    /// Full cryptographic validity, grace period included
    pub validity: Duration,
}

/// Produces signed certificate text.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign one certificate. Failures carry the signer's diagnostics.
    async fn sign(&self, request: &SigningRequest<'_>) -> Result<String>;
}

/// Runs `nebula-cert sign` against an on-disk CA.
#[derive(Debug, Clone)]
pub struct NebulaCertSigner {
    executable: PathBuf,
    ca_crt: PathBuf,
    ca_key: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl NebulaCertSigner {
    /// Create a signer using the given `nebula-cert` binary and CA files
    #[must_use]
    pub fn new(
        executable: impl Into<PathBuf>,
        ca_crt: impl Into<PathBuf>,
        ca_key: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            ca_crt: ca_crt.into(),
            ca_key: ca_key.into(),
            scratch_dir: None,
        }
    }

    /// Put scratch directories under `dir` instead of the system temp dir
    #[must_use]
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    fn command(&self, request: &SigningRequest<'_>, out_crt: &Path, in_pub: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("sign")
            .arg("-name")
            .arg(request.name)
            .arg("-ip")
            .arg(request.ip)
            .arg("-groups")
            .arg(request.groups.join(","))
            .arg("-ca-crt")
            .arg(&self.ca_crt)
            .arg("-ca-key")
            .arg(&self.ca_key)
            .arg("-out-crt")
            .arg(out_crt)
            .arg("-in-pub")
            .arg(in_pub)
            .arg("-duration")
            .arg(format!("{}s", request.validity.as_secs()));
        cmd
    }
}

#[async_trait]
impl Signer for NebulaCertSigner {
    async fn sign(&self, request: &SigningRequest<'_>) -> Result<String> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("supernova-sign-");
        let scratch = match &self.scratch_dir {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };

        let in_pub = scratch.path().join("host.pub");
        let out_crt = scratch.path().join("host.crt");

        tokio::fs::write(&in_pub, request.public_key).await?;

        debug!(
            device = %request.name,
            validity_secs = request.validity.as_secs(),
            "running nebula-cert sign"
        );

        let output = self
            .command(request, &out_crt, &in_pub)
            .output()
            .await
            .map_err(|e| SupernovaError::Signer {
                message: format!("failed to run {}: {e}", self.executable.display()),
                output: String::new(),
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(SupernovaError::Signer {
                message: format!("{} exited with {}", self.executable.display(), output.status),
                output: combined,
            });
        }

        Ok(tokio::fs::read_to_string(&out_crt).await?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Shell stand-in for `nebula-cert`: logs its argv, copies the public key
    /// into the certificate, fails when the key says so.
    const FAKE_NEBULA_CERT: &str = r#"#!/bin/sh
echo "$@" > "$(dirname "$0")/args.log"
out=""; pub=""
while [ $# -gt 0 ]; do
  case "$1" in
    -out-crt) out="$2"; shift ;;
    -in-pub) pub="$2"; shift ;;
  esac
  shift
done
if grep -q BAD "$pub"; then
  echo "error: invalid public key" >&2
  exit 1
fi
printf 'CERT(%s)' "$(cat "$pub")" > "$out"
"#;

    fn fake_signer() -> (TempDir, NebulaCertSigner) {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("nebula-cert");
        std::fs::write(&exe, FAKE_NEBULA_CERT).unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();

        let signer = NebulaCertSigner::new(&exe, dir.path().join("ca.crt"), dir.path().join("ca.key"))
            .scratch_dir(&scratch);
        (dir, signer)
    }

    fn request<'a>(public_key: &'a str, groups: &'a [String]) -> SigningRequest<'a> {
        SigningRequest {
            name: "node1",
            ip: "10.0.0.5/24",
            groups,
            public_key,
            validity: Duration::from_secs(259_200),
        }
    }

    #[tokio::test]
    async fn test_sign_passes_expected_arguments() {
        let (dir, signer) = fake_signer();
        let groups = vec!["servers".to_string(), "laptops".to_string()];

        let crt = signer.sign(&request("PUBKEY", &groups)).await.unwrap();
        assert_eq!(crt, "CERT(PUBKEY)");

        let args = std::fs::read_to_string(dir.path().join("args.log")).unwrap();
        assert!(args.starts_with("sign -name node1 -ip 10.0.0.5/24 -groups servers,laptops"));
        assert!(args.contains(&format!("-ca-crt {}", dir.path().join("ca.crt").display())));
        assert!(args.contains(&format!("-ca-key {}", dir.path().join("ca.key").display())));
        assert!(args.trim_end().ends_with("-duration 259200s"));
    }

    #[tokio::test]
    async fn test_scratch_material_removed_after_call() {
        let (dir, signer) = fake_signer();
        signer.sign(&request("PUBKEY", &[])).await.unwrap();
        let _ = signer.sign(&request("BAD", &[])).await;

        let leftovers = std::fs::read_dir(dir.path().join("scratch")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_signer_failure_carries_output() {
        let (_dir, signer) = fake_signer();
        match signer.sign(&request("BAD", &[])).await {
            Err(SupernovaError::Signer { output, .. }) => {
                assert!(output.contains("invalid public key"));
            }
            other => panic!("expected signer error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_executable_is_signer_error() {
        let signer = NebulaCertSigner::new("/nonexistent/nebula-cert", "ca.crt", "ca.key");
        assert!(matches!(
            signer.sign(&request("PUBKEY", &[])).await,
            Err(SupernovaError::Signer { .. })
        ));
    }
}
