use std::path::PathBuf;

/// Address of one staged Avro file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub flow_job_name: String,
    pub sync_batch_id: i64,
    /// File name within the batch, unique per `(flow, batch)`.
    pub name: String,
}

/// Where the sync stage left its Avro files. Object-store backends live
/// outside this workspace; this trait is the seam they implement.
#[async_trait::async_trait]
pub trait StageStore: Send + Sync {
    /// All staged files of one batch, ordered by name. An empty result is
    /// a batch without changes, not an error.
    async fn list_batch(
        &self,
        flow_job_name: &str,
        sync_batch_id: i64,
    ) -> anyhow::Result<Vec<StagedFile>>;

    async fn fetch(&self, file: &StagedFile) -> anyhow::Result<Vec<u8>>;
}

/// Staged files on the local filesystem, laid out as
/// `<root>/<flow_job_name>/<sync_batch_id>/<name>.avro`.
pub struct LocalStageStore {
    root: PathBuf,
}

impl LocalStageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn batch_dir(&self, flow_job_name: &str, sync_batch_id: i64) -> PathBuf {
        self.root
            .join(flow_job_name)
            .join(sync_batch_id.to_string())
    }

    /// Write a staged file, creating the batch directory as needed.
    pub async fn put(&self, file: &StagedFile, bytes: &[u8]) -> anyhow::Result<()> {
        let dir = self.batch_dir(&file.flow_job_name, file.sync_batch_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&file.name), bytes).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StageStore for LocalStageStore {
    async fn list_batch(
        &self,
        flow_job_name: &str,
        sync_batch_id: i64,
    ) -> anyhow::Result<Vec<StagedFile>> {
        let dir = self.batch_dir(flow_job_name, sync_batch_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".avro") {
                continue;
            }
            files.push(StagedFile {
                flow_job_name: flow_job_name.to_string(),
                sync_batch_id,
                name,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn fetch(&self, file: &StagedFile) -> anyhow::Result<Vec<u8>> {
        let path = self
            .batch_dir(&file.flow_job_name, file.sync_batch_id)
            .join(&file.name);
        Ok(tokio::fs::read(&path).await?)
    }
}
