//! # supernovad
//!
//! Per-node daemon that keeps a Nebula tunnel running on the config the
//! control endpoint serves.
//!
//! ## Lifecycle
//!
//! - **Fetch**: the first config is fetched with exponential backoff until it succeeds
//! - **Launch**: the config is written to a private file and the tunnel started against it
//! - **Poll**: the config is re-fetched periodically; a change is written in place
//!   and the tunnel is sent SIGHUP
//! - **Exit**: the daemon stops when the tunnel does, failing if the tunnel failed

pub mod cli;
pub mod config_file;
pub mod settings;
pub mod supervisor;
pub mod tunnel;

pub use cli::run;
pub use config_file::ConfigFile;
pub use settings::Settings;
pub use supervisor::{Supervisor, SupervisorState, Termination, DEFAULT_POLL_INTERVAL};
pub use tunnel::{NebulaLauncher, ReloadNotifier, RunningTunnel, SignalReloader, TunnelExit, TunnelLauncher};
