//! Command-line entry point.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use supernova_core::DeviceRecord;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::config::CertsvcConfig;
use crate::controller::RenewalController;
use crate::handler::Handler;
use crate::issuer::CertificateIssuer;
use crate::signer::NebulaCertSigner;
use crate::store::{FileStore, RenewalStore};

/// Nebula certificate issuance and bulk renewal for supernova devices
#[derive(Parser, Debug)]
#[command(name = "supernova-certsvc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (TOML); defaults apply when it does not exist
    #[arg(short, long, env = "CERTSVC_CONFIG", default_value = "certsvc.toml", global = true)]
    pub config: PathBuf,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Handle one JSON request (`sign` or `periodic_renew`) and print the reply
    Handle(HandleArgs),

    /// Run a renewal sweep and print the number of renewed devices
    Renew,

    /// List devices and their renewal watermarks
    List,
}

#[derive(Args, Debug)]
pub struct HandleArgs {
    /// Read the request from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = CertsvcConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config
        .apply_env(|name| std::env::var(name).ok())
        .context("applying environment overrides")?;

    let store = Arc::new(FileStore::new(&config.store_path));

    match cli.command {
        Commands::Handle(args) => {
            let handler = build_handler(&config, store)?;
            let raw = read_request(args.input, tokio::io::stdin()).await?;
            let response = handler.handle(&raw).await?;
            println!("{}", serde_json::to_string(&response)?);
        }
        Commands::Renew => {
            let handler = build_handler(&config, store)?;
            let response = handler.handle(r#"{"action":"periodic_renew"}"#).await?;
            println!("{}", serde_json::to_string(&response)?);
        }
        Commands::List => list_devices(store.as_ref()).await?,
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

fn build_handler(config: &CertsvcConfig, store: Arc<FileStore>) -> Result<Handler> {
    config.validate().context("invalid certsvc configuration")?;

    let signer = NebulaCertSigner::new(&config.nebula_cert, &config.ca_crt, &config.ca_key);
    let issuer = CertificateIssuer::new(Arc::new(signer));
    let controller =
        RenewalController::new(store, issuer.clone()).concurrency(config.renew_concurrency);

    Ok(Handler::new(issuer, controller))
}

/// The request comes from `input` when given, otherwise from `stdin`.
async fn read_request<R>(input: Option<PathBuf>, mut stdin: R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    match input {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut raw = String::new();
            stdin
                .read_to_string(&mut raw)
                .await
                .context("reading request from stdin")?;
            Ok(raw)
        }
    }
}

async fn list_devices(store: &dyn RenewalStore) -> Result<()> {
    let now = Utc::now().timestamp();

    for item in store.list().await? {
        match DeviceRecord::decode(&item) {
            Ok(record) => {
                let renewable_at = Utc
                    .timestamp_opt(record.renewable_at, 0)
                    .single()
                    .map_or_else(|| record.renewable_at.to_string(), |t| t.to_rfc3339());
                let state = if record.is_due(now) { "due" } else { "ok" };
                println!("{}\t{}\t{}\t{}", record.device_name, record.ip, renewable_at, state);
            }
            Err(e) => warn!(error = %e, "skipping malformed record"),
        }
    }

    Ok(())
}
