//! Core types shared by the supernova certificate service and node daemon.
//!
//! This crate provides the pieces both halves of the system agree on:
//!
//! - **Types**: the persisted [`DeviceRecord`], the certificate service
//!   request/response payloads and the device config exchange
//! - **Errors**: a single [`SupernovaError`] with a [`Result`] alias
//!
//! # Example
//!
//! ```rust,ignore
//! use supernova_core::{CertificateRequest, DeviceRecord};
//!
//! let record = DeviceRecord::decode(&item)?;
//! let request = CertificateRequest::from(&record);
//! ```

mod error;
pub mod types;

pub use error::{Result, SupernovaError};
pub use types::*;
