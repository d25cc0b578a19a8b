use models::TableSchema;
use sqlx::types::Json;
use std::collections::BTreeMap;

/// The per-batch snapshot payload: source table name to its schema.
pub type SnapshotPayload = BTreeMap<String, TableSchema>;

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub flow_job_name: String,
    pub batch_id: i64,
    pub payload: Json<SnapshotPayload>,
}

/// Persist the schema snapshot absorbed at `batch_id`. Snapshots are
/// immutable; re-persisting the same batch is a no-op.
pub async fn persist(
    flow_job_name: &str,
    batch_id: i64,
    payload: &SnapshotPayload,
    pool: &sqlx::PgPool,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into schema_snapshots (flow_job_name, batch_id, payload)
        values ($1, $2, $3)
        on conflict (flow_job_name, batch_id) do nothing
        "#,
    )
    .bind(flow_job_name)
    .bind(batch_id)
    .bind(Json(payload))
    .execute(pool)
    .await?;
    Ok(())
}

/// The most recent snapshot at or before `batch_id`, if any.
pub async fn fetch_at(
    flow_job_name: &str,
    batch_id: i64,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Option<SnapshotRow>> {
    sqlx::query_as::<_, SnapshotRow>(
        r#"
        select flow_job_name, batch_id, payload
        from schema_snapshots
        where flow_job_name = $1 and batch_id <= $2
        order by batch_id desc
        limit 1
        "#,
    )
    .bind(flow_job_name)
    .bind(batch_id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_latest(
    flow_job_name: &str,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Option<SnapshotRow>> {
    fetch_at(flow_job_name, i64::MAX, pool).await
}
