/// Alerts with the same key and config written within this window are
/// considered duplicates and suppressed.
const DEDUP_WINDOW_MINUTES: i32 = 15;

/// Insert an alert unless an equal-keyed one was recorded recently.
/// Returns whether a row was written.
pub async fn record(
    alert_key: &str,
    alert_config_id: i64,
    message: &str,
    pool: &sqlx::PgPool,
) -> sqlx::Result<bool> {
    let inserted = sqlx::query(
        r#"
        insert into alerts (alert_key, alert_config_id, created_timestamp, message)
        select $1, $2, now(), $3
        where not exists (
            select 1 from alerts
            where alert_key = $1
              and alert_config_id = $2
              and created_timestamp > now() - make_interval(mins => $4)
        )
        "#,
    )
    .bind(alert_key)
    .bind(alert_config_id)
    .bind(message)
    .bind(DEDUP_WINDOW_MINUTES)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(inserted == 1)
}
