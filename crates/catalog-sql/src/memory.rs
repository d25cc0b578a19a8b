//! An in-memory Catalog for tests of dependent crates.

use crate::flow_state::BatchPointers;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    pointers: BTreeMap<String, BatchPointers>,
    alerts: Vec<(String, i64, String)>,
}

#[derive(Default)]
pub struct MemoryCatalog(Mutex<State>);

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pointers(&self, flow_job_name: &str, sync: i64, normalize: i64) {
        self.0.lock().unwrap().pointers.insert(
            flow_job_name.to_string(),
            BatchPointers {
                last_sync_batch_id: sync,
                last_normalize_batch_id: normalize,
            },
        );
    }

    pub fn pointers(&self, flow_job_name: &str) -> Option<BatchPointers> {
        self.0.lock().unwrap().pointers.get(flow_job_name).copied()
    }

    pub fn alerts(&self) -> Vec<(String, i64, String)> {
        self.0.lock().unwrap().alerts.clone()
    }
}

#[async_trait::async_trait]
impl crate::Catalog for MemoryCatalog {
    async fn batch_pointers(&self, flow_job_name: &str) -> anyhow::Result<BatchPointers> {
        self.pointers(flow_job_name)
            .ok_or_else(|| anyhow::anyhow!("flow {flow_job_name} is not registered"))
    }

    async fn advance_normalize_pointer(
        &self,
        flow_job_name: &str,
        from: i64,
        to: i64,
    ) -> anyhow::Result<()> {
        let mut state = self.0.lock().unwrap();
        let pointers = state
            .pointers
            .get_mut(flow_job_name)
            .ok_or_else(|| anyhow::anyhow!("flow {flow_job_name} is not registered"))?;

        if pointers.last_normalize_batch_id != from {
            anyhow::bail!(
                "normalize pointer of flow {flow_job_name} moved concurrently (expected {from})"
            );
        }
        pointers.last_normalize_batch_id = to;
        Ok(())
    }

    async fn record_alert(
        &self,
        alert_key: &str,
        alert_config_id: i64,
        message: &str,
    ) -> anyhow::Result<bool> {
        let mut state = self.0.lock().unwrap();
        let duplicate = state
            .alerts
            .iter()
            .any(|(key, config, _)| key == alert_key && *config == alert_config_id);
        if duplicate {
            return Ok(false);
        }
        state
            .alerts
            .push((alert_key.to_string(), alert_config_id, message.to_string()));
        Ok(true)
    }
}
