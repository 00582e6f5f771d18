//! Bulk certificate renewal.
//!
//! A sweep re-reads the table, re-issues every due record and commits each
//! result with a compare-and-swap on the watermark it read. Overlapping
//! sweeps are safe without a lock: the loser of a race gets
//! [`UpdateOutcome::Conflict`] and the record is left to the winner.

use chrono::Utc;
use futures_util::{future, stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use supernova_core::{CertificateRequest, DeviceRecord, Result, SupernovaError};
use tracing::{info, warn};

use crate::issuer::CertificateIssuer;
use crate::store::{RenewalStore, UpdateOutcome};

/// Records renewed in parallel within one sweep unless configured otherwise
pub const DEFAULT_RENEW_CONCURRENCY: usize = 4;

/// Runs renewal sweeps over a [`RenewalStore`].
#[derive(Clone)]
pub struct RenewalController {
    store: Arc<dyn RenewalStore>,
    issuer: CertificateIssuer,
    concurrency: usize,
}

impl RenewalController {
    /// Create a controller
    pub fn new(store: Arc<dyn RenewalStore>, issuer: CertificateIssuer) -> Self {
        Self {
            store,
            issuer,
            concurrency: DEFAULT_RENEW_CONCURRENCY,
        }
    }

    /// Set how many records are renewed at once (minimum 1)
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Renew every due record; returns how many were committed.
    ///
    /// Only a failed scan is an error. Per-record failures and lost races
    /// are logged and only show up as a lower count.
    pub async fn run_sweep(&self) -> Result<u64> {
        let now = Utc::now().timestamp();
        let due = self.store.scan_due(now).await?;
        info!(due = due.len(), now, "starting renewal sweep");

        let renewed = stream::iter(due)
            .map(|item| self.renew_item(item))
            .buffer_unordered(self.concurrency)
            .filter(|renewed| future::ready(*renewed))
            .count()
            .await;

        info!(renewed, "renewal sweep finished");
        Ok(u64::try_from(renewed).unwrap_or(u64::MAX))
    }

    async fn renew_item(&self, item: Value) -> bool {
        let record = match DeviceRecord::decode(&item) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed record");
                return false;
            }
        };

        match self.renew(&record).await {
            Ok(UpdateOutcome::Applied) => {
                info!(device = %record.device_name, "renewed certificate");
                true
            }
            Ok(UpdateOutcome::Conflict) => {
                info!(
                    device = %record.device_name,
                    expected = record.renewable_at,
                    "watermark moved since scan, leaving record for next sweep"
                );
                false
            }
            Err(e) => {
                warn!(device = %record.device_name, error = %e, "failed to renew certificate");
                false
            }
        }
    }

    /// Re-issue one record and commit it guarded on the watermark it carries
    pub async fn renew(&self, record: &DeviceRecord) -> Result<UpdateOutcome> {
        let issued = self.issuer.issue(&CertificateRequest::from(record)).await?;

        // The timestamp guard assumes the new watermark lands after the old
        // one; a signer clock far behind the table would break that.
        if issued.renewable_at <= record.renewable_at {
            return Err(SupernovaError::Store(format!(
                "new watermark {} does not advance past {}",
                issued.renewable_at, record.renewable_at
            )));
        }

        self.store
            .update_renewal(
                &record.device_name,
                record.renewable_at,
                issued.renewable_at,
                &issued.crt,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::testing::RecordingSigner;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Barrier;

    fn device(name: &str, renewable_at: i64) -> Value {
        json!({
            "deviceName": name,
            "publicKey": format!("KEY-{name}"),
            "groups": ["g1"],
            "ip": "10.0.0.5/24",
            "crt": "old",
            "renewableAt": renewable_at,
        })
    }

    fn controller(store: Arc<dyn RenewalStore>, signer: RecordingSigner) -> RenewalController {
        RenewalController::new(store, CertificateIssuer::new(Arc::new(signer)))
    }

    #[tokio::test]
    async fn test_sweep_renews_due_record() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now().timestamp();
        store.put_item(device("node1", now - 1)).await.unwrap();

        let count = controller(store.clone(), RecordingSigner::default())
            .run_sweep()
            .await
            .unwrap();
        let after = Utc::now().timestamp();

        assert_eq!(count, 1);
        let item = store.get("node1").await.unwrap();
        let renewable_at = item["renewableAt"].as_i64().unwrap();
        assert!(renewable_at >= now + 86_400 && renewable_at <= after + 86_400);
        assert_eq!(item["crt"], "CRT[node1]");
    }

    #[tokio::test]
    async fn test_sweep_skips_records_not_yet_due() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now().timestamp();
        store.put_item(device("fresh", now + 3_600)).await.unwrap();

        let signer = RecordingSigner::default();
        let count = controller(store.clone(), signer).run_sweep().await.unwrap();

        assert_eq!(count, 0);
        assert_eq!(store.get("fresh").await.unwrap()["crt"], "old");
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failures() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now().timestamp();
        store.put_item(device("ok-1", now - 10)).await.unwrap();
        store.put_item(device("broken", now - 10)).await.unwrap();
        store.put_item(device("ok-2", now - 10)).await.unwrap();
        store
            .put_item(json!({ "deviceName": "malformed", "renewableAt": now - 10, "publicKey": 7 }))
            .await
            .unwrap();

        let count = controller(store.clone(), RecordingSigner::failing_for(&["broken"]))
            .concurrency(1)
            .run_sweep()
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.get("broken").await.unwrap()["crt"], "old");
        assert_eq!(store.get("broken").await.unwrap()["renewableAt"], now - 10);
    }

    /// Store whose watermark is advanced by a racer between scan and update.
    struct RacingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl RenewalStore for RacingStore {
        async fn scan_due(&self, now: i64) -> Result<Vec<Value>> {
            let due = self.inner.scan_due(now).await?;
            for item in &due {
                let name = item["deviceName"].as_str().unwrap();
                let seen = item["renewableAt"].as_i64().unwrap();
                self.inner
                    .update_renewal(name, seen, now + 50_000, "racer")
                    .await?;
            }
            Ok(due)
        }

        async fn update_renewal(
            &self,
            device_name: &str,
            expected_renewable_at: i64,
            renewable_at: i64,
            crt: &str,
        ) -> Result<UpdateOutcome> {
            self.inner
                .update_renewal(device_name, expected_renewable_at, renewable_at, crt)
                .await
        }

        async fn list(&self) -> Result<Vec<Value>> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_stale_guard_skips_record_without_error() {
        let racing = Arc::new(RacingStore {
            inner: MemoryStore::new(),
        });
        let now = Utc::now().timestamp();
        racing.inner.put_item(device("node1", now - 1)).await.unwrap();

        let count = controller(racing.clone(), RecordingSigner::default())
            .run_sweep()
            .await
            .unwrap();

        assert_eq!(count, 0);
        let item = racing.inner.get("node1").await.unwrap();
        assert_eq!(item["crt"], "racer");
        assert_eq!(item["renewableAt"], now + 50_000);
    }

    /// Holds every scanner at a barrier so overlapping sweeps both read the
    /// table before either commits.
    struct GatedStore {
        inner: Arc<MemoryStore>,
        scanned: Arc<Barrier>,
    }

    #[async_trait]
    impl RenewalStore for GatedStore {
        async fn scan_due(&self, now: i64) -> Result<Vec<Value>> {
            let due = self.inner.scan_due(now).await?;
            self.scanned.wait().await;
            Ok(due)
        }

        async fn update_renewal(
            &self,
            device_name: &str,
            expected_renewable_at: i64,
            renewable_at: i64,
            crt: &str,
        ) -> Result<UpdateOutcome> {
            self.inner
                .update_renewal(device_name, expected_renewable_at, renewable_at, crt)
                .await
        }

        async fn list(&self) -> Result<Vec<Value>> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_overlapping_sweeps_renew_once() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now().timestamp();
        for i in 0..5 {
            store.put_item(device(&format!("node{i}"), now - 100)).await.unwrap();
        }

        let scanned = Arc::new(Barrier::new(2));
        let gated = || {
            Arc::new(GatedStore {
                inner: store.clone(),
                scanned: scanned.clone(),
            })
        };
        let signer_a = Arc::new(RecordingSigner::labelled("a:"));
        let signer_b = Arc::new(RecordingSigner::labelled("b:"));
        let first = RenewalController::new(gated(), CertificateIssuer::new(signer_a.clone()));
        let second = RenewalController::new(gated(), CertificateIssuer::new(signer_b.clone()));

        let (a, b) = tokio::join!(first.run_sweep(), second.run_sweep());
        let (a, b) = (a.unwrap(), b.unwrap());

        // Both sweeps saw and signed every record, but each record has one winner.
        assert_eq!(signer_a.calls(), 5);
        assert_eq!(signer_b.calls(), 5);
        assert_eq!(a + b, 5);

        let mut won_by_a = 0;
        for i in 0..5 {
            let item = store.get(&format!("node{i}")).await.unwrap();
            let crt = item["crt"].as_str().unwrap();
            if crt == format!("a:CRT[node{i}]") {
                won_by_a += 1;
            } else {
                assert_eq!(crt, format!("b:CRT[node{i}]"));
            }
            assert!(item["renewableAt"].as_i64().unwrap() >= now + 86_400);
        }
        assert_eq!(won_by_a, a);
    }

    struct UnreachableStore;

    #[async_trait]
    impl RenewalStore for UnreachableStore {
        async fn scan_due(&self, _now: i64) -> Result<Vec<Value>> {
            Err(SupernovaError::Store("connection refused".into()))
        }

        async fn update_renewal(&self, _: &str, _: i64, _: i64, _: &str) -> Result<UpdateOutcome> {
            unreachable!("scan never succeeds")
        }

        async fn list(&self) -> Result<Vec<Value>> {
            Err(SupernovaError::Store("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_scan_failure_aborts_sweep() {
        let result = controller(Arc::new(UnreachableStore), RecordingSigner::default())
            .run_sweep()
            .await;
        assert!(matches!(result, Err(SupernovaError::Store(_))));
    }

    #[tokio::test]
    async fn test_renew_advances_watermark() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now().timestamp();
        store.put_item(device("node1", now - 5)).await.unwrap();
        let record = DeviceRecord::decode(&store.get("node1").await.unwrap()).unwrap();

        let outcome = controller(store.clone(), RecordingSigner::default())
            .renew(&record)
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Applied);
        let item = store.get("node1").await.unwrap();
        assert!(item["renewableAt"].as_i64().unwrap() > record.renewable_at);
    }

    #[tokio::test]
    async fn test_renew_refuses_watermark_that_does_not_advance() {
        let store = Arc::new(MemoryStore::new());
        let far_future = Utc::now().timestamp() + 10 * 86_400;
        store.put_item(device("node1", far_future)).await.unwrap();
        let record = DeviceRecord::decode(&store.get("node1").await.unwrap()).unwrap();

        let result = controller(store.clone(), RecordingSigner::default())
            .renew(&record)
            .await;

        assert!(matches!(result, Err(SupernovaError::Store(_))));
        let item = store.get("node1").await.unwrap();
        assert_eq!(item["crt"], "old");
        assert_eq!(item["renewableAt"], far_future);
    }
}
