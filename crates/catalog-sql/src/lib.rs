pub mod alerts;
pub mod flow_state;
pub mod schema_snapshots;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

pub use flow_state::BatchPointers;

/// The catalog surface consumed by the normalize engine. The catalog is an
/// external collaborator; this trait is its seam, implemented by
/// [`PgCatalog`] in production and an in-memory catalog in tests.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn batch_pointers(&self, flow_job_name: &str) -> anyhow::Result<BatchPointers>;

    /// Advance `last_normalize_batch_id` from `from` to `to`, failing if the
    /// stored pointer no longer equals `from`. This is the linearization
    /// point of a normalize invocation; nothing else may move the pointer.
    async fn advance_normalize_pointer(
        &self,
        flow_job_name: &str,
        from: i64,
        to: i64,
    ) -> anyhow::Result<()>;

    /// Record an alert, de-duplicated by key within a recency window.
    /// Returns whether a new alert row was written.
    async fn record_alert(
        &self,
        alert_key: &str,
        alert_config_id: i64,
        message: &str,
    ) -> anyhow::Result<bool>;
}

/// Catalog over a Postgres connection pool.
#[derive(Clone)]
pub struct PgCatalog {
    pool: sqlx::PgPool,
}

impl PgCatalog {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Catalog for PgCatalog {
    async fn batch_pointers(&self, flow_job_name: &str) -> anyhow::Result<BatchPointers> {
        let pointers = flow_state::fetch_pointers(flow_job_name, &self.pool).await?;
        pointers.ok_or_else(|| anyhow::anyhow!("flow {flow_job_name} is not registered"))
    }

    async fn advance_normalize_pointer(
        &self,
        flow_job_name: &str,
        from: i64,
        to: i64,
    ) -> anyhow::Result<()> {
        flow_state::advance_normalize_pointer(flow_job_name, from, to, &self.pool).await
    }

    async fn record_alert(
        &self,
        alert_key: &str,
        alert_config_id: i64,
        message: &str,
    ) -> anyhow::Result<bool> {
        let inserted = alerts::record(alert_key, alert_config_id, message, &self.pool).await?;
        Ok(inserted)
    }
}
