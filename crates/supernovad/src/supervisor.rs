//! Node supervisor: keeps the tunnel running on the latest config.
//!
//! ```text
//!   Fetching ──ok──▶ Running ──poll──▶ Polling ──changed──▶ Reloading
//!       │                ▲                │                     │
//!       │                └───unchanged────┘◀────────────────────┘
//!       └──────────── tunnel exit (any state) ──▶ Terminated / Aborted
//! ```
//!
//! The initial fetch retries until it succeeds. After launch the tunnel's
//! exit is raced against the poll loop, so an exit ends supervision
//! whatever the loop is doing at the time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use supernova_client::{ConfigFetcher, RetryPolicy};
use supernova_core::{Result, SupernovaError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config_file::ConfigFile;
use crate::tunnel::{ReloadNotifier, RunningTunnel, TunnelExit, TunnelLauncher};

/// Time between config polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(71);

/// Where the supervisor is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Initial fetch, retrying until it succeeds
    Fetching,
    /// Tunnel started, waiting for the next poll
    Running,
    /// Fetching the config again
    Polling,
    /// Writing a changed config and signalling the tunnel
    Reloading,
    /// Stopped after a clean tunnel exit or cancellation
    Terminated,
    /// Stopped on a fatal error
    Aborted,
}

/// Why [`Supervisor::run`] returned successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Tunnel exited with status zero
    TunnelExited,
    /// Shutdown was requested
    Cancelled,
}

/// Drives the fetch, launch, poll and reload cycle.
pub struct Supervisor {
    fetcher: Arc<dyn ConfigFetcher>,
    launcher: Arc<dyn TunnelLauncher>,
    retry: RetryPolicy,
    poll_interval: Duration,
    config_dir: Option<PathBuf>,
    state: watch::Sender<SupervisorState>,
}

impl Supervisor {
    /// Create a supervisor with the default poll interval and unbounded retry
    pub fn new(fetcher: Arc<dyn ConfigFetcher>, launcher: Arc<dyn TunnelLauncher>) -> Self {
        let (state, _) = watch::channel(SupervisorState::Fetching);
        Self {
            fetcher,
            launcher,
            retry: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            config_dir: None,
            state,
        }
    }

    /// Set the fetch retry policy
    #[must_use]
    pub const fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Put the config file in `dir` instead of the system temp directory
    #[must_use]
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Supervise until the tunnel exits or `cancel` fires.
    ///
    /// A clean exit or cancellation returns `Ok`; an abnormal exit or a
    /// failure to start is an error. The config file is removed either way.
    /// Cancellation does not stop the tunnel process.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Termination> {
        let result = self.supervise(&cancel).await;
        match &result {
            Ok(termination) => {
                info!(?termination, "supervisor stopped");
                self.transition(SupervisorState::Terminated);
            }
            Err(e) => {
                error!(error = %e, "supervisor aborted");
                self.transition(SupervisorState::Aborted);
            }
        }
        result
    }

    async fn supervise(&self, cancel: &CancellationToken) -> Result<Termination> {
        self.transition(SupervisorState::Fetching);
        let initial = match self.fetch(cancel).await {
            Ok(config) => config,
            Err(SupernovaError::Cancelled) => return Ok(Termination::Cancelled),
            Err(e) => return Err(e),
        };

        let config_file = match &self.config_dir {
            Some(dir) => ConfigFile::create_in(dir, &initial)?,
            None => ConfigFile::create(&initial)?,
        };
        info!(path = %config_file.path().display(), "wrote initial config");

        let RunningTunnel { reloader, exit } = self.launcher.launch(config_file.path()).await?;
        self.transition(SupervisorState::Running);

        tokio::select! {
            status = exit => match status {
                TunnelExit::Clean => {
                    info!("tunnel exited cleanly");
                    Ok(Termination::TunnelExited)
                }
                TunnelExit::Abnormal(reason) => {
                    Err(SupernovaError::Tunnel(format!("tunnel exited: {reason}")))
                }
            },
            outcome = self.poll(&config_file, reloader.as_ref(), initial, cancel) => outcome,
        }
    }

    async fn poll(
        &self,
        config_file: &ConfigFile,
        reloader: &dyn ReloadNotifier,
        mut current: String,
        cancel: &CancellationToken,
    ) -> Result<Termination> {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(Termination::Cancelled),
                () = tokio::time::sleep(self.poll_interval) => {}
            }

            self.transition(SupervisorState::Polling);
            let latest = match self.fetch(cancel).await {
                Ok(config) => config,
                Err(SupernovaError::Cancelled) => return Ok(Termination::Cancelled),
                Err(e) => return Err(e),
            };

            if latest == current {
                debug!("config unchanged");
                self.transition(SupervisorState::Running);
                continue;
            }

            self.transition(SupervisorState::Reloading);
            info!("config changed, reloading tunnel");

            // Keep the old config as current so the next poll tries again.
            if let Err(e) = config_file.write(&latest) {
                warn!(error = %e, "failed to write config, will retry next poll");
                self.transition(SupervisorState::Running);
                continue;
            }
            current = latest;

            if let Err(e) = reloader.reload().await {
                warn!(error = %e, "failed to signal tunnel reload");
            }
            self.transition(SupervisorState::Running);
        }
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<String> {
        self.retry.retry(cancel, || self.fetcher.fetch()).await
    }

    fn transition(&self, next: SupervisorState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "state transition");
        }
    }
}
