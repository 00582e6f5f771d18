//! Tunnel process control.
//!
//! The supervisor only needs three things from the tunnel: start it against
//! a config path, tell it to re-read that path, and learn when it exits.
//! [`TunnelLauncher`] and [`ReloadNotifier`] are those seams;
//! [`NebulaLauncher`] is the real process.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use supernova_core::{Result, SupernovaError};
use tokio::process::Command;
use tracing::{debug, info};

/// How the tunnel process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelExit {
    /// Exit status zero
    Clean,
    /// Non-zero status, killed by a signal, or the wait itself failed
    Abnormal(String),
}

/// Asks a running tunnel to re-read its config file.
#[async_trait]
pub trait ReloadNotifier: Send + Sync {
    /// Deliver the reload request
    async fn reload(&self) -> Result<()>;
}

/// A started tunnel.
pub struct RunningTunnel {
    /// Reload handle
    pub reloader: Box<dyn ReloadNotifier>,
    /// Resolves once, when the process ends
    pub exit: BoxFuture<'static, TunnelExit>,
}

/// Starts the tunnel against a config file.
#[async_trait]
pub trait TunnelLauncher: Send + Sync {
    /// Start the tunnel reading `config_path`
    async fn launch(&self, config_path: &Path) -> Result<RunningTunnel>;
}

/// Runs `<executable> -config <path>` with inherited stdio.
#[derive(Debug, Clone)]
pub struct NebulaLauncher {
    executable: PathBuf,
}

impl NebulaLauncher {
    /// Create a launcher for `executable`
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

#[async_trait]
impl TunnelLauncher for NebulaLauncher {
    async fn launch(&self, config_path: &Path) -> Result<RunningTunnel> {
        let mut child = Command::new(&self.executable)
            .arg("-config")
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                SupernovaError::Tunnel(format!(
                    "failed to start {}: {e}",
                    self.executable.display()
                ))
            })?;

        let pid = child
            .id()
            .ok_or_else(|| SupernovaError::Tunnel("tunnel exited before it could be tracked".into()))?;
        info!(pid, executable = %self.executable.display(), "tunnel started");

        let exit = async move {
            match child.wait().await {
                Ok(status) if status.success() => TunnelExit::Clean,
                Ok(status) => TunnelExit::Abnormal(status.to_string()),
                Err(e) => TunnelExit::Abnormal(format!("failed to wait for tunnel: {e}")),
            }
        }
        .boxed();

        Ok(RunningTunnel {
            reloader: Box::new(SignalReloader::new(pid)),
            exit,
        })
    }
}

/// Sends SIGHUP to the tunnel process.
#[derive(Debug, Clone, Copy)]
pub struct SignalReloader {
    pid: u32,
}

impl SignalReloader {
    /// Target process `pid`
    pub const fn new(pid: u32) -> Self {
        Self { pid }
    }
}

#[async_trait]
impl ReloadNotifier for SignalReloader {
    #[cfg(unix)]
    async fn reload(&self) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(self.pid)
            .map_err(|_| SupernovaError::Tunnel(format!("pid {} out of range", self.pid)))?;
        kill(Pid::from_raw(raw), Signal::SIGHUP)
            .map_err(|e| SupernovaError::Tunnel(format!("failed to signal tunnel: {e}")))?;
        debug!(pid = self.pid, "sent SIGHUP");
        Ok(())
    }

    #[cfg(not(unix))]
    async fn reload(&self) -> Result<()> {
        Err(SupernovaError::Tunnel(
            "config reload signals are only supported on unix".into(),
        ))
    }
}
