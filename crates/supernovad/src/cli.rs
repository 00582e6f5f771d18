//! Command-line entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use supernova_client::ConfigClient;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;
use crate::supervisor::{Supervisor, Termination};
use crate::tunnel::NebulaLauncher;

/// Keep a Nebula tunnel running on the config served by the control endpoint.
///
/// Identity and endpoint come from the environment: NEBULA_EXECUTABLE,
/// DASH_ENDPOINT, DEVICE_NAME, DEVICE_TOKEN and optionally CONFIG_OVERRIDE
/// and HOST_KEY_B64. Each can instead be read from the file named by
/// `<NAME>_FILE`.
#[derive(Parser, Debug)]
#[command(name = "supernovad")]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// Seconds between config polls
    #[arg(long, env = "SUPERNOVAD_POLL_INTERVAL", default_value_t = 71, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

/// Run the daemon until the tunnel exits or a shutdown signal arrives.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::from_env().context("reading settings")?;
    settings.write_host_key().context("writing host key")?;

    let client = ConfigClient::builder(
        &settings.dash_endpoint,
        &settings.device_name,
        &settings.device_token,
    )
    .config_override(&settings.config_override)
    .build()
    .context("building control endpoint client")?;

    info!(
        device = %settings.device_name,
        endpoint = %settings.dash_endpoint,
        poll_interval = cli.poll_interval,
        "starting supernovad"
    );

    let supervisor = Supervisor::new(
        Arc::new(client),
        Arc::new(NebulaLauncher::new(&settings.nebula_executable)),
    )
    .poll_interval(Duration::from_secs(cli.poll_interval));

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    match supervisor.run(cancel).await? {
        Termination::TunnelExited => info!("tunnel exited, shutting down"),
        Termination::Cancelled => info!("shutdown requested, leaving tunnel running"),
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("received shutdown signal");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
