use anyhow::Context;
use models::RawRecord;
use std::sync::Arc;

/// Connection parameters for a ClickHouse endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClickHouseConfig {
    /// HTTP(S) endpoint, e.g. `https://host:8443`.
    pub url: url::Url,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl ClickHouseConfig {
    fn build(&self) -> clickhouse::Client {
        let mut client = clickhouse::Client::default()
            .with_url(self.url.as_str())
            .with_database(&self.database)
            .with_user(&self.user);
        if let Some(password) = &self.password {
            client = client.with_password(password);
        }
        client
    }
}

/// A single ClickHouse connection handle (an HTTP client with its own pool).
pub struct ClickHouseClient {
    database: String,
    inner: clickhouse::Client,
}

/// Raw rows as sent over the ClickHouse native insert path. Field names
/// must match the raw-table column names.
#[derive(clickhouse::Row, serde::Serialize)]
struct RawRow {
    #[serde(rename = "_peerdb_uid")]
    uid: String,
    #[serde(rename = "_peerdb_timestamp")]
    timestamp: i64,
    #[serde(rename = "_peerdb_destination_table_name")]
    destination_table_name: String,
    #[serde(rename = "_peerdb_data")]
    data: String,
    #[serde(rename = "_peerdb_match_data")]
    match_data: String,
    #[serde(rename = "_peerdb_batch_id")]
    batch_id: i64,
    #[serde(rename = "_peerdb_record_type")]
    record_type: i64,
    #[serde(rename = "_peerdb_unchanged_toast_columns")]
    unchanged_toast_columns: String,
}

impl From<RawRecord> for RawRow {
    fn from(r: RawRecord) -> Self {
        Self {
            uid: r.uid,
            timestamp: r.timestamp,
            destination_table_name: r.destination_table_name,
            data: r.data,
            match_data: r.match_data,
            batch_id: r.batch_id,
            record_type: r.record_type,
            unchanged_toast_columns: r.unchanged_toast_columns,
        }
    }
}

#[async_trait::async_trait]
impl crate::Client for ClickHouseClient {
    async fn execute(&self, sql: &str) -> anyhow::Result<()> {
        self.inner
            .query(sql)
            .execute()
            .await
            .with_context(|| format!("executing statement against database {}", self.database))
    }

    async fn query_strings(&self, sql: &str) -> anyhow::Result<Vec<String>> {
        self.inner
            .query(sql)
            .fetch_all::<String>()
            .await
            .with_context(|| format!("querying database {}", self.database))
    }

    async fn check_table_exists(&self, database: &str, table: &str) -> anyhow::Result<bool> {
        let count = self
            .inner
            .query("SELECT count() FROM system.tables WHERE database = ? AND name = ?")
            .bind(database)
            .bind(table)
            .fetch_one::<u64>()
            .await
            .context("querying system.tables")?;
        Ok(count > 0)
    }

    async fn insert_raw(&self, table: &str, rows: Vec<RawRecord>) -> anyhow::Result<()> {
        let mut insert = self
            .inner
            .insert::<RawRow>(table)
            .context("opening raw insert")?;
        for row in rows {
            insert.write(&RawRow::from(row)).await?;
        }
        insert.end().await.context("closing raw insert")?;
        Ok(())
    }
}

/// A ClickHouse destination endpoint. The shared client is established at
/// construction; `connect` opens a fresh client with its own pool for an
/// executor worker.
pub struct ClickHouseDestination {
    config: ClickHouseConfig,
    shared: Arc<ClickHouseClient>,
}

impl ClickHouseDestination {
    pub fn new(config: ClickHouseConfig) -> Self {
        let shared = Arc::new(ClickHouseClient {
            database: config.database.clone(),
            inner: config.build(),
        });
        Self { config, shared }
    }
}

#[async_trait::async_trait]
impl crate::Destination for ClickHouseDestination {
    fn shared(&self) -> Arc<dyn crate::Client> {
        self.shared.clone()
    }

    async fn connect(&self) -> anyhow::Result<Arc<dyn crate::Client>> {
        Ok(Arc::new(ClickHouseClient {
            database: self.config.database.clone(),
            inner: self.config.build(),
        }))
    }
}
