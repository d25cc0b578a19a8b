use serde::Serialize;

/// The two progress pointers of a flow. Invariant:
/// `last_normalize_batch_id <= last_sync_batch_id`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BatchPointers {
    pub last_sync_batch_id: i64,
    pub last_normalize_batch_id: i64,
}

pub async fn fetch_pointers(
    flow_job_name: &str,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Option<BatchPointers>> {
    sqlx::query_as::<_, BatchPointers>(
        r#"
        select last_sync_batch_id, last_normalize_batch_id
        from flow_state
        where flow_job_name = $1
        "#,
    )
    .bind(flow_job_name)
    .fetch_optional(pool)
    .await
}

/// Registers a flow with zeroed pointers, leaving an existing row untouched.
pub async fn upsert_flow(flow_job_name: &str, pool: &sqlx::PgPool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into flow_state (flow_job_name, last_sync_batch_id, last_normalize_batch_id)
        values ($1, 0, 0)
        on conflict (flow_job_name) do nothing
        "#,
    )
    .bind(flow_job_name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Guarded pointer advance. The `from` check makes the write a compare-and-
/// swap: a concurrent mutation of the pointer surfaces as an error here
/// instead of silently losing progress.
pub async fn advance_normalize_pointer(
    flow_job_name: &str,
    from: i64,
    to: i64,
    pool: &sqlx::PgPool,
) -> anyhow::Result<()> {
    let updated = sqlx::query(
        r#"
        update flow_state
        set last_normalize_batch_id = $3
        where flow_job_name = $1 and last_normalize_batch_id = $2
        "#,
    )
    .bind(flow_job_name)
    .bind(from)
    .bind(to)
    .execute(pool)
    .await?
    .rows_affected();

    if updated != 1 {
        anyhow::bail!(
            "normalize pointer of flow {flow_job_name} moved concurrently (expected {from})"
        );
    }
    Ok(())
}
