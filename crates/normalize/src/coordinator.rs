//! The per-flow batch coordinator: stage-load, plan, execute, advance.

use crate::{execute, plan, project, raw, Error};
use catalog_sql::Catalog;
use models::{Env, TableMapping, TableSchema};
use stage::StageStore;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

// Default alert routing; the alerter maps config ids to channels.
const ALERT_CONFIG_DEFAULT: i64 = 0;

/// One normalize invocation, as handed over by the orchestrator.
#[derive(Debug, Clone)]
pub struct NormalizeRequest {
    pub flow_job_name: String,
    /// The sync batch the caller observed. Caps the window read from the
    /// catalog; zero means "normalize everything synced so far".
    pub sync_batch_id: i64,
    pub table_mappings: Vec<TableMapping>,
    /// Source table name to its current schema snapshot.
    pub table_schemas: BTreeMap<String, TableSchema>,
    pub env: Env,
}

/// The batch window a normalize invocation covered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRange {
    pub start_batch_id: i64,
    pub end_batch_id: i64,
}

/// Run one coordinator invocation. Safe to re-invoke after a crash: every
/// step before the pointer advance is idempotent, and the advance itself is
/// a guarded compare-and-swap. The orchestrator guarantees at most one
/// invocation per flow at a time.
#[tracing::instrument(skip_all, fields(flow_job_name = %request.flow_job_name))]
pub async fn normalize(
    catalog: &dyn Catalog,
    destination: &dyn destination::Destination,
    stage_store: &dyn StageStore,
    request: &NormalizeRequest,
    token: &CancellationToken,
) -> Result<BatchRange, Error> {
    let flow = request.flow_job_name.as_str();

    let pointers = catalog
        .batch_pointers(flow)
        .await
        .map_err(|source| Error::Catalog {
            flow_job_name: flow.to_string(),
            source,
        })?;

    let norm = pointers.last_normalize_batch_id;
    let sync = if request.sync_batch_id > 0 {
        // Never normalize past what the caller observed; a concurrently
        // advancing sync would make replays nondeterministic.
        pointers.last_sync_batch_id.min(request.sync_batch_id)
    } else {
        pointers.last_sync_batch_id
    };

    if norm >= sync {
        tracing::info!(norm, sync, "nothing to normalize");
        return Ok(BatchRange {
            start_batch_id: norm,
            end_batch_id: sync,
        });
    }
    tracing::info!(norm, sync, "normalizing batch window");

    let client = destination.shared();
    let raw_table = raw::table_name(flow);

    if let Err(source) = stage::load_window(
        stage_store,
        client.as_ref(),
        flow,
        &raw_table,
        norm,
        sync,
        token,
    )
    .await
    {
        let error = Error::Stage {
            flow_job_name: flow.to_string(),
            start: norm,
            end: sync,
            source,
        };
        if let crate::ErrorClass::MalformedStage = error.class() {
            raise_critical(catalog, flow, &error).await;
        }
        return Err(error);
    }

    let tables = client
        .query_strings(&raw::distinct_tables_sql(&raw_table, norm, sync))
        .await
        .map_err(|source| Error::Destination {
            flow_job_name: flow.to_string(),
            source,
        })?;

    let mut plans = Vec::new();
    for table in &tables {
        match table_plans(request, table, &raw_table, norm, sync) {
            Ok(mut table_plans) => plans.append(&mut table_plans),
            Err(error) => {
                // Drift in one table must not stall the others: skip it and
                // keep the window moving. The rows stay in the raw table.
                tracing::warn!(
                    table,
                    error = %error,
                    class = ?error.class(),
                    "skipping table in raw window"
                );
            }
        }
    }

    execute::execute_plans(
        destination,
        flow,
        (norm, sync),
        plans,
        request.env.parallel_normalize(),
        token,
    )
    .await?;

    if token.is_cancelled() {
        return Err(Error::Cancelled {
            flow_job_name: flow.to_string(),
        });
    }

    catalog
        .advance_normalize_pointer(flow, norm, sync)
        .await
        .map_err(|source| Error::Catalog {
            flow_job_name: flow.to_string(),
            source,
        })?;

    tracing::info!(norm, sync, "advanced normalize pointer");
    Ok(BatchRange {
        start_batch_id: norm + 1,
        end_batch_id: sync,
    })
}

/// Plans for one destination table of the raw window, or the skippable
/// error explaining why it has none.
fn table_plans(
    request: &NormalizeRequest,
    table: &str,
    raw_table: &str,
    norm: i64,
    sync: i64,
) -> Result<Vec<plan::Plan>, Error> {
    let mapping = request
        .table_mappings
        .iter()
        .find(|m| m.destination_table == table)
        .ok_or_else(|| Error::UnknownTable {
            flow_job_name: request.flow_job_name.clone(),
            table: table.to_string(),
        })?;

    let schema = request
        .table_schemas
        .get(&mapping.source_table)
        .ok_or_else(|| Error::MissingSchema {
            table: table.to_string(),
            source_table: mapping.source_table.clone(),
        })?;

    let project = project::project(mapping, schema, &request.env)?;
    Ok(plan::build_plans(&project, raw_table, norm, sync, &request.env))
}

async fn raise_critical(catalog: &dyn Catalog, flow: &str, error: &Error) {
    let alert_key = format!("{flow}:normalize:malformed-stage");
    match catalog
        .record_alert(&alert_key, ALERT_CONFIG_DEFAULT, &error.to_string())
        .await
    {
        Ok(true) => tracing::error!(alert_key, "raised CRITICAL alert"),
        Ok(false) => tracing::debug!(alert_key, "alert already raised recently"),
        Err(alert_error) => {
            // The original failure is what the caller needs to see.
            tracing::warn!(alert_key, error = %alert_error, "failed to record alert");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ErrorClass;
    use catalog_sql::memory::MemoryCatalog;
    use destination::mock::{MockClient, MockDestination};
    use models::{ColumnSchema, LogicalType, RawRecord};
    use stage::memory::MemoryStageStore;

    struct Harness {
        catalog: MemoryCatalog,
        destination: MockDestination,
        stage: MemoryStageStore,
        request: NormalizeRequest,
        token: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let catalog = MemoryCatalog::new();
            catalog.set_pointers("flow", 2, 0);

            let mut table_schemas = BTreeMap::new();
            table_schemas.insert(
                "public.users".to_string(),
                TableSchema::new(vec![
                    ColumnSchema {
                        name: "id".to_string(),
                        logical_type: LogicalType::BigInt,
                        nullable: false,
                        primary_key: true,
                    },
                    ColumnSchema {
                        name: "v".to_string(),
                        logical_type: LogicalType::Text,
                        nullable: true,
                        primary_key: false,
                    },
                ]),
            );

            Self {
                catalog,
                destination: MockDestination::new(),
                stage: MemoryStageStore::new(),
                request: NormalizeRequest {
                    flow_job_name: "flow".to_string(),
                    sync_batch_id: 0,
                    table_mappings: vec![TableMapping::new("public.users", "users")],
                    table_schemas,
                    env: Env::default(),
                },
                token: CancellationToken::new(),
            }
        }

        fn client(&self) -> MockClient {
            self.destination.client()
        }

        fn stage_insert(&self, batch_id: i64, uid: &str, ts: i64) {
            self.stage.stage_records(
                "flow",
                batch_id,
                &[RawRecord {
                    uid: uid.to_string(),
                    timestamp: ts,
                    destination_table_name: "users".to_string(),
                    data: r#"{"id":1,"v":"x"}"#.to_string(),
                    match_data: String::new(),
                    batch_id,
                    record_type: 0,
                    unchanged_toast_columns: String::new(),
                }],
            );
        }

        async fn run(&self) -> Result<BatchRange, Error> {
            normalize(
                &self.catalog,
                &self.destination,
                &self.stage,
                &self.request,
                &self.token,
            )
            .await
        }
    }

    #[tokio::test]
    async fn test_success_advances_pointer() {
        let harness = Harness::new();
        harness.stage_insert(1, "a", 10);
        harness.stage_insert(2, "b", 11);
        harness
            .client()
            .on_query("SELECT DISTINCT", vec!["users".to_string()]);

        let range = harness.run().await.unwrap();
        assert_eq!(
            range,
            BatchRange {
                start_batch_id: 1,
                end_batch_id: 2
            }
        );

        // Progress is monotone: the pointer now equals the observed sync id.
        let pointers = harness.catalog.pointers("flow").unwrap();
        assert_eq!(pointers.last_normalize_batch_id, 2);

        // Both staged batches landed in the raw table; one plan ran.
        assert_eq!(harness.client().inserted().len(), 2);
        let inserts: Vec<String> = harness
            .client()
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("INSERT INTO `users`"))
            .collect();
        assert_eq!(inserts.len(), 1);
        assert!(inserts[0].contains("`_peerdb_batch_id` > 0 AND `_peerdb_batch_id` <= 2"));
    }

    #[tokio::test]
    async fn test_no_work_is_a_no_op() {
        let harness = Harness::new();
        harness.catalog.set_pointers("flow", 2, 2);

        let range = harness.run().await.unwrap();
        assert_eq!(
            range,
            BatchRange {
                start_batch_id: 2,
                end_batch_id: 2
            }
        );
        assert!(harness.client().statements().is_empty());
    }

    #[tokio::test]
    async fn test_request_caps_the_window() {
        let mut harness = Harness::new();
        harness.request.sync_batch_id = 1;
        harness.stage_insert(1, "a", 10);
        harness.stage_insert(2, "b", 11);
        harness
            .client()
            .on_query("SELECT DISTINCT", vec!["users".to_string()]);

        let range = harness.run().await.unwrap();
        assert_eq!(range.end_batch_id, 1);
        assert_eq!(
            harness
                .catalog
                .pointers("flow")
                .unwrap()
                .last_normalize_batch_id,
            1
        );
        // Batch 2 stays staged for the next invocation.
        assert_eq!(harness.client().inserted().len(), 1);
    }

    #[tokio::test]
    async fn test_plan_failure_keeps_pointer() {
        let harness = Harness::new();
        harness.stage_insert(1, "a", 10);
        harness.stage_insert(2, "b", 11);
        harness
            .client()
            .on_query("SELECT DISTINCT", vec!["users".to_string()]);
        harness.client().fail_execute_once("INSERT INTO `users`");

        let err = harness.run().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::PlanExecution);
        assert_eq!(
            harness
                .catalog
                .pointers("flow")
                .unwrap()
                .last_normalize_batch_id,
            0
        );
    }

    #[tokio::test]
    async fn test_rerun_after_failure_replays_the_window() {
        let harness = Harness::new();
        harness.stage_insert(1, "a", 10);
        harness
            .client()
            .on_query("SELECT DISTINCT", vec!["users".to_string()]);
        harness.client().fail_execute_once("INSERT INTO `users`");

        harness.run().await.unwrap_err();
        let failed: Vec<String> = harness
            .client()
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("INSERT INTO `users`"))
            .collect();

        let range = harness.run().await.unwrap();
        assert_eq!(range.end_batch_id, 2);

        // The replay issues the identical statement: the window is pinned
        // by the unchanged pointer, and the replacing engine collapses any
        // double-inserted versions.
        let replayed: Vec<String> = harness
            .client()
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("INSERT INTO `users`"))
            .collect();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0], failed[0]);
        assert_eq!(replayed[1], failed[0]);
    }

    #[tokio::test]
    async fn test_unknown_table_is_skipped() {
        let harness = Harness::new();
        harness.stage_insert(1, "a", 10);
        harness.stage_insert(2, "b", 11);
        harness.client().on_query(
            "SELECT DISTINCT",
            vec!["users".to_string(), "dropped_mid_flight".to_string()],
        );

        let range = harness.run().await.unwrap();
        assert_eq!(range.end_batch_id, 2);

        let statements = harness.client().statements();
        assert!(statements
            .iter()
            .any(|s| s.starts_with("INSERT INTO `users`")));
        assert!(!statements.iter().any(|s| s.contains("dropped_mid_flight")
            && s.starts_with("INSERT INTO")));
    }

    #[tokio::test]
    async fn test_malformed_stage_raises_critical_alert() {
        let harness = Harness::new();
        harness.stage.put("flow", 1, "0000.avro", b"garbage".to_vec());

        let err = harness.run().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::MalformedStage);

        let alerts = harness.catalog.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, "flow:normalize:malformed-stage");
        // The pointer is untouched; the invocation must be retried after
        // the file is re-staged.
        assert_eq!(
            harness
                .catalog
                .pointers("flow")
                .unwrap()
                .last_normalize_batch_id,
            0
        );
    }

    #[tokio::test]
    async fn test_cancellation_skips_pointer_advance() {
        let harness = Harness::new();
        harness.stage_insert(1, "a", 10);
        harness.token.cancel();

        let err = harness.run().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Cancelled);
        assert_eq!(
            harness
                .catalog
                .pointers("flow")
                .unwrap()
                .last_normalize_batch_id,
            0
        );
    }

    #[tokio::test]
    async fn test_stale_column_setting_skips_only_its_table() {
        let mut harness = Harness::new();
        // A second table whose mapping still renames a column the source
        // dropped: its plan is skipped, the others keep moving.
        let mut orders = TableMapping::new("public.orders", "orders");
        orders.columns.push(models::ColumnSetting {
            source_name: "long_gone".to_string(),
            destination_name: Some("gone".to_string()),
            destination_type: None,
            ordering: 0,
        });
        harness.request.table_mappings.push(orders);
        harness.request.table_schemas.insert(
            "public.orders".to_string(),
            TableSchema::new(vec![ColumnSchema {
                name: "id".to_string(),
                logical_type: LogicalType::BigInt,
                nullable: false,
                primary_key: true,
            }]),
        );
        harness.stage_insert(1, "a", 10);
        harness.stage_insert(2, "b", 11);
        harness.client().on_query(
            "SELECT DISTINCT",
            vec!["users".to_string(), "orders".to_string()],
        );

        let range = harness.run().await.unwrap();
        assert_eq!(range.end_batch_id, 2);

        let statements = harness.client().statements();
        assert!(statements
            .iter()
            .any(|s| s.starts_with("INSERT INTO `users`")));
        assert!(!statements
            .iter()
            .any(|s| s.starts_with("INSERT INTO `orders`")));
    }

    #[tokio::test]
    async fn test_drifted_table_does_not_stall_others() {
        let mut harness = Harness::new();
        // A second mapping whose schema snapshot is missing entirely.
        harness
            .request
            .table_mappings
            .push(TableMapping::new("public.orders", "orders"));
        harness.stage_insert(1, "a", 10);
        harness.stage_insert(2, "b", 11);
        harness.client().on_query(
            "SELECT DISTINCT",
            vec!["users".to_string(), "orders".to_string()],
        );

        let range = harness.run().await.unwrap();
        assert_eq!(range.end_batch_id, 2);

        let statements = harness.client().statements();
        assert!(statements
            .iter()
            .any(|s| s.starts_with("INSERT INTO `users`")));
        assert!(!statements
            .iter()
            .any(|s| s.starts_with("INSERT INTO `orders`")));
    }
}
