use crate::{read_batch, Error, StageStore};
use models::raw_columns;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// What one stage-load pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub batches_loaded: u64,
    pub rows_inserted: u64,
    /// Rows skipped because their uid was already present for the batch,
    /// i.e. a previous invocation landed them before failing later.
    pub rows_deduplicated: u64,
}

/// Load every staged Avro file for batches `(norm_batch_id, sync_batch_id]`
/// into the raw table, ascending. Reloading a batch is idempotent: uids
/// already present for that batch are filtered out, since the destination
/// offers no overwrite-by-key.
pub async fn load_window(
    store: &dyn StageStore,
    client: &dyn destination::Client,
    flow_job_name: &str,
    raw_table: &str,
    norm_batch_id: i64,
    sync_batch_id: i64,
    token: &CancellationToken,
) -> Result<LoadSummary, Error> {
    let mut summary = LoadSummary::default();

    for batch_id in (norm_batch_id + 1)..=sync_batch_id {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let files = store
            .list_batch(flow_job_name, batch_id)
            .await
            .map_err(|source| Error::Store { batch_id, source })?;
        if files.is_empty() {
            // A batch with no staged files carried no changes.
            continue;
        }

        let mut present = existing_uids(client, raw_table, batch_id).await?;
        let mut rows = Vec::new();

        for file in &files {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let bytes = store
                .fetch(file)
                .await
                .map_err(|source| Error::Store { batch_id, source })?;
            let records = read_batch(&bytes).map_err(|err| Error::Malformed {
                file: file.name.clone(),
                batch_id,
                detail: err.to_string(),
            })?;

            for record in records {
                if record.batch_id != batch_id {
                    return Err(Error::Malformed {
                        file: file.name.clone(),
                        batch_id,
                        detail: format!("row carries batch id {}", record.batch_id),
                    });
                }
                if !present.insert(record.uid.clone()) {
                    summary.rows_deduplicated += 1;
                    continue;
                }
                rows.push(record);
            }
        }

        let inserted = rows.len() as u64;
        if !rows.is_empty() {
            client
                .insert_raw(raw_table, rows)
                .await
                .map_err(|source| Error::Destination { batch_id, source })?;
        }

        tracing::info!(
            flow_job_name,
            batch_id,
            files = files.len(),
            rows = inserted,
            deduplicated = summary.rows_deduplicated,
            "loaded staged batch"
        );
        summary.batches_loaded += 1;
        summary.rows_inserted += inserted;
    }

    Ok(summary)
}

async fn existing_uids(
    client: &dyn destination::Client,
    raw_table: &str,
    batch_id: i64,
) -> Result<HashSet<String>, Error> {
    let sql = format!(
        "SELECT {uid} FROM {table} WHERE {batch} = {batch_id}",
        uid = client.quote_identifier(raw_columns::UID),
        table = client.quote_identifier(raw_table),
        batch = client.quote_identifier(raw_columns::BATCH_ID),
    );
    let uids = client
        .query_strings(&sql)
        .await
        .map_err(|source| Error::Destination { batch_id, source })?;
    Ok(uids.into_iter().collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::MemoryStageStore;
    use destination::mock::MockClient;
    use models::RawRecord;

    fn record(uid: &str, batch_id: i64) -> RawRecord {
        RawRecord {
            uid: uid.to_string(),
            timestamp: 1,
            destination_table_name: "users".to_string(),
            data: r#"{"id":1}"#.to_string(),
            match_data: String::new(),
            batch_id,
            record_type: 0,
            unchanged_toast_columns: String::new(),
        }
    }

    #[tokio::test]
    async fn test_loads_window_in_batch_order() {
        let store = MemoryStageStore::new();
        store.stage_records("flow", 4, &[record("a", 4)]);
        store.stage_records("flow", 5, &[record("b", 5), record("c", 5)]);
        // Batch 6 staged no files: skipped, not an error.

        let client = MockClient::new();
        let summary = load_window(
            &store,
            &client,
            "flow",
            "_peerdb_raw_flow",
            3,
            6,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            summary,
            LoadSummary {
                batches_loaded: 2,
                rows_inserted: 3,
                rows_deduplicated: 0,
            }
        );

        let inserted = client.inserted();
        assert_eq!(inserted.len(), 2);
        assert_eq!(inserted[0].0, "_peerdb_raw_flow");
        assert_eq!(inserted[0].1[0].batch_id, 4);
        assert_eq!(inserted[1].1.len(), 2);
    }

    #[tokio::test]
    async fn test_reload_filters_landed_uids() {
        let store = MemoryStageStore::new();
        store.stage_records("flow", 4, &[record("a", 4), record("b", 4)]);

        let client = MockClient::new();
        client.on_query("_peerdb_batch_id` = 4", vec!["a".to_string()]);

        let summary = load_window(
            &store,
            &client,
            "flow",
            "_peerdb_raw_flow",
            3,
            4,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.rows_inserted, 1);
        assert_eq!(summary.rows_deduplicated, 1);
        assert_eq!(client.inserted()[0].1[0].uid, "b");
    }

    #[tokio::test]
    async fn test_malformed_file_is_fatal() {
        let store = MemoryStageStore::new();
        store.put("flow", 4, "0000.avro", b"garbage".to_vec());

        let client = MockClient::new();
        let err = load_window(
            &store,
            &client,
            "flow",
            "_peerdb_raw_flow",
            3,
            4,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Malformed { batch_id: 4, .. }));
        assert!(client.inserted().is_empty());
    }

    #[tokio::test]
    async fn test_batch_address_mismatch_is_malformed() {
        let store = MemoryStageStore::new();
        store.stage_records("flow", 4, &[record("a", 9)]);

        let client = MockClient::new();
        let err = load_window(
            &store,
            &client,
            "flow",
            "_peerdb_raw_flow",
            3,
            4,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Malformed { batch_id: 4, .. }));
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_loading() {
        let store = MemoryStageStore::new();
        store.stage_records("flow", 4, &[record("a", 4)]);

        let token = CancellationToken::new();
        token.cancel();

        let client = MockClient::new();
        let err = load_window(&store, &client, "flow", "_peerdb_raw_flow", 3, 4, &token)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(client.inserted().is_empty());
    }
}
