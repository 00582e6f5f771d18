//! Control endpoint client for supernova nodes.
//!
//! [`ConfigClient`] fetches a node's tunnel config from the control plane;
//! [`RetryPolicy`] wraps any fallible async call in cancellable exponential
//! backoff.

mod client;
mod config;

pub use client::{ConfigClient, ConfigClientBuilder, ConfigFetcher};
pub use config::*;
pub use supernova_core::{Result, SupernovaError};
