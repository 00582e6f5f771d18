//! In-memory store for tests and embedding.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use supernova_core::{Result, SupernovaError};
use tokio::sync::Mutex;

use super::{compare_and_swap, device_name, is_due, RenewalStore, UpdateOutcome};

/// In-process device table, keyed by device name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a raw item; it only needs a string `deviceName`
    pub async fn put_item(&self, item: Value) -> Result<()> {
        let name = device_name(&item)
            .ok_or_else(|| SupernovaError::Store("item has no deviceName".into()))?
            .to_string();
        self.items.lock().await.insert(name, item);
        Ok(())
    }

    /// Raw item for `device_name`, if present
    pub async fn get(&self, device_name: &str) -> Option<Value> {
        self.items.lock().await.get(device_name).cloned()
    }
}

#[async_trait]
impl RenewalStore for MemoryStore {
    async fn scan_due(&self, now: i64) -> Result<Vec<Value>> {
        let items = self.items.lock().await;
        Ok(items.values().filter(|item| is_due(item, now)).cloned().collect())
    }

    async fn update_renewal(
        &self,
        device_name: &str,
        expected_renewable_at: i64,
        renewable_at: i64,
        crt: &str,
    ) -> Result<UpdateOutcome> {
        let mut items = self.items.lock().await;
        Ok(match items.get_mut(device_name) {
            Some(item) => compare_and_swap(item, expected_renewable_at, renewable_at, crt),
            None => UpdateOutcome::Conflict,
        })
    }

    async fn list(&self) -> Result<Vec<Value>> {
        Ok(self.items.lock().await.values().cloned().collect())
    }
}
