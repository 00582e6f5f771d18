//! Device table access.
//!
//! Items come back raw; callers decode them with
//! [`supernova_core::DeviceRecord::decode`] so one bad row cannot take a sweep
//! down. The only write is a compare-and-swap on the renewal watermark.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use supernova_core::{attr, Result};

/// Result of a conditional update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Guard held, new watermark and certificate written
    Applied,
    /// Record missing or its watermark moved; nothing written
    Conflict,
}

/// Persistent table of device records.
///
/// Implementations must apply [`RenewalStore::update_renewal`] atomically:
/// two writers holding the same expected watermark can never both succeed.
#[async_trait]
pub trait RenewalStore: Send + Sync {
    /// Items whose `renewableAt` is strictly less than `now`
    async fn scan_due(&self, now: i64) -> Result<Vec<Value>>;

    /// Set `renewableAt` and `crt` if the stored watermark still equals
    /// `expected_renewable_at`
    async fn update_renewal(
        &self,
        device_name: &str,
        expected_renewable_at: i64,
        renewable_at: i64,
        crt: &str,
    ) -> Result<UpdateOutcome>;

    /// Every item in the table
    async fn list(&self) -> Result<Vec<Value>>;
}

/// Scan filter shared by the stores. Items without a numeric watermark are
/// never due.
fn is_due(item: &Value, now: i64) -> bool {
    item.get(attr::RENEWABLE_AT)
        .and_then(Value::as_i64)
        .is_some_and(|renewable_at| renewable_at < now)
}

fn device_name(item: &Value) -> Option<&str> {
    item.get(attr::DEVICE_NAME).and_then(Value::as_str)
}

/// Apply the conditional update to one item in place
fn compare_and_swap(
    item: &mut Value,
    expected_renewable_at: i64,
    renewable_at: i64,
    crt: &str,
) -> UpdateOutcome {
    let current = item.get(attr::RENEWABLE_AT).and_then(Value::as_i64);
    if current != Some(expected_renewable_at) {
        return UpdateOutcome::Conflict;
    }

    match item.as_object_mut() {
        Some(fields) => {
            fields.insert(attr::RENEWABLE_AT.to_string(), Value::from(renewable_at));
            fields.insert(attr::CRT.to_string(), Value::from(crt));
            UpdateOutcome::Applied
        }
        None => UpdateOutcome::Conflict,
    }
}
