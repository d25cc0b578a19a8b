//! An in-memory stage store for tests of dependent crates.

use crate::{write_batch, StageStore, StagedFile};
use models::RawRecord;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStageStore {
    // (flow, batch) -> name -> file bytes
    files: Mutex<BTreeMap<(String, i64), BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, flow_job_name: &str, sync_batch_id: i64, name: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .entry((flow_job_name.to_string(), sync_batch_id))
            .or_default()
            .insert(name.to_string(), bytes);
    }

    /// Encode `records` as one staged Avro file of the batch.
    pub fn stage_records(&self, flow_job_name: &str, sync_batch_id: i64, records: &[RawRecord]) {
        let bytes = write_batch(records).expect("encoding staged records");
        let name = format!("{:04}.avro", self.file_count(flow_job_name, sync_batch_id));
        self.put(flow_job_name, sync_batch_id, &name, bytes);
    }

    fn file_count(&self, flow_job_name: &str, sync_batch_id: i64) -> usize {
        self.files
            .lock()
            .unwrap()
            .get(&(flow_job_name.to_string(), sync_batch_id))
            .map_or(0, |files| files.len())
    }
}

#[async_trait::async_trait]
impl StageStore for MemoryStageStore {
    async fn list_batch(
        &self,
        flow_job_name: &str,
        sync_batch_id: i64,
    ) -> anyhow::Result<Vec<StagedFile>> {
        let files = self.files.lock().unwrap();
        let Some(batch) = files.get(&(flow_job_name.to_string(), sync_batch_id)) else {
            return Ok(Vec::new());
        };
        Ok(batch
            .keys()
            .map(|name| StagedFile {
                flow_job_name: flow_job_name.to_string(),
                sync_batch_id,
                name: name.clone(),
            })
            .collect())
    }

    async fn fetch(&self, file: &StagedFile) -> anyhow::Result<Vec<u8>> {
        let files = self.files.lock().unwrap();
        files
            .get(&(file.flow_job_name.clone(), file.sync_batch_id))
            .and_then(|batch| batch.get(&file.name))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("staged file {} is missing", file.name))
    }
}
