mod clickhouse;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use crate::clickhouse::{ClickHouseClient, ClickHouseConfig, ClickHouseDestination};

use models::RawRecord;
use std::sync::Arc;

/// One destination connection. The engine speaks to every destination
/// through this capability set and never branches on destination identity.
/// Implementations must be safe for concurrent use across connections.
#[async_trait::async_trait]
pub trait Client: Send + Sync {
    /// Run a statement, discarding any result.
    async fn execute(&self, sql: &str) -> anyhow::Result<()>;

    /// Run a query returning a single string column.
    async fn query_strings(&self, sql: &str) -> anyhow::Result<Vec<String>>;

    async fn check_table_exists(&self, database: &str, table: &str) -> anyhow::Result<bool>;

    /// Append raw change records to `table` using the destination's native
    /// bulk-insert path.
    async fn insert_raw(&self, table: &str, rows: Vec<RawRecord>) -> anyhow::Result<()>;

    fn quote_identifier(&self, ident: &str) -> String {
        quote_backtick(ident)
    }
}

/// A destination endpoint: hands out the invocation-shared connection and
/// opens fresh ones for executor workers.
#[async_trait::async_trait]
pub trait Destination: Send + Sync {
    fn shared(&self) -> Arc<dyn Client>;

    async fn connect(&self) -> anyhow::Result<Arc<dyn Client>>;
}

/// Backtick quoting with backslash escapes, as understood by ClickHouse
/// and MySQL-family dialects.
pub fn quote_backtick(ident: &str) -> String {
    let escaped = ident.replace('\\', "\\\\").replace('`', "\\`");
    format!("`{escaped}`")
}
