//! JSON file store.

use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::PathBuf;
use supernova_core::{DeviceRecord, Result, SupernovaError};
use tokio::sync::Mutex;
use tracing::debug;

use super::{compare_and_swap, device_name, is_due, RenewalStore, UpdateOutcome};

/// Device table persisted as a JSON array of items.
///
/// Every operation reads the file fresh. Writes go to a sibling temp file
/// that is renamed over the table, and are serialized by an in-process lock,
/// so the compare-and-swap is atomic for all users of one `FileStore`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (lazily) the table at `path`; a missing file is an empty table
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Insert or replace a record
    pub async fn put(&self, record: &DeviceRecord) -> Result<()> {
        let item = record.to_item()?;
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        items.retain(|existing| device_name(existing) != Some(record.device_name.as_str()));
        items.push(item);
        self.save(&items).await
    }

    async fn load(&self) -> Result<Vec<Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SupernovaError::Store(format!(
                    "reading {}: {e}",
                    self.path.display()
                )))
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(_) => Err(SupernovaError::Store(format!(
                "{} is not a JSON array",
                self.path.display()
            ))),
            Err(e) => Err(SupernovaError::Store(format!(
                "parsing {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, items: &[Value]) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let bytes = serde_json::to_vec_pretty(items)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), items = items.len(), "device table written");
        Ok(())
    }
}

#[async_trait]
impl RenewalStore for FileStore {
    async fn scan_due(&self, now: i64) -> Result<Vec<Value>> {
        let _guard = self.lock.lock().await;
        let items = self.load().await?;
        Ok(items.into_iter().filter(|item| is_due(item, now)).collect())
    }

    async fn update_renewal(
        &self,
        device_name: &str,
        expected_renewable_at: i64,
        renewable_at: i64,
        crt: &str,
    ) -> Result<UpdateOutcome> {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;

        let Some(item) = items
            .iter_mut()
            .find(|item| super::device_name(item) == Some(device_name))
        else {
            return Ok(UpdateOutcome::Conflict);
        };

        let outcome = compare_and_swap(item, expected_renewable_at, renewable_at, crt);
        if outcome == UpdateOutcome::Applied {
            self.save(&items).await?;
        }
        Ok(outcome)
    }

    async fn list(&self) -> Result<Vec<Value>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }
}
