//! Physical layout of the per-flow raw change log.

use destination::quote_backtick as quote;
use models::raw_columns;

pub fn table_name(flow_job_name: &str) -> String {
    format!("_peerdb_raw_{flow_job_name}")
}

/// DDL of the raw table. The ordering key keeps window scans contiguous:
/// every normalize pass reads one `_peerdb_batch_id` range, split by
/// destination table.
pub fn create_table_sql(raw_table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} ({uid} String, {timestamp} Int64, \
         {dest} String, {data} String, {match_data} String, {batch} Int64, \
         {record_type} Int64, {unchanged} String) \
         ENGINE = MergeTree() ORDER BY ({batch}, {dest})",
        table = quote(raw_table),
        uid = quote(raw_columns::UID),
        timestamp = quote(raw_columns::TIMESTAMP),
        dest = quote(raw_columns::DESTINATION_TABLE_NAME),
        data = quote(raw_columns::DATA),
        match_data = quote(raw_columns::MATCH_DATA),
        batch = quote(raw_columns::BATCH_ID),
        record_type = quote(raw_columns::RECORD_TYPE),
        unchanged = quote(raw_columns::UNCHANGED_TOAST_COLUMNS),
    )
}

pub async fn setup_raw_table(
    client: &dyn destination::Client,
    flow_job_name: &str,
) -> anyhow::Result<()> {
    client
        .execute(&create_table_sql(&table_name(flow_job_name)))
        .await
}

/// Destination tables with at least one change in `(start, end]`.
pub fn distinct_tables_sql(raw_table: &str, start: i64, end: i64) -> String {
    format!(
        "SELECT DISTINCT {dest} FROM {table} WHERE {batch} > {start} AND {batch} <= {end}",
        dest = quote(raw_columns::DESTINATION_TABLE_NAME),
        table = quote(raw_table),
        batch = quote(raw_columns::BATCH_ID),
    )
}
