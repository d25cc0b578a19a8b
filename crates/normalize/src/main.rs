use anyhow::Context;
use clap::Parser;
use destination::{ClickHouseConfig, ClickHouseDestination, Destination};
use models::{Env, TableMapping, TableSchema};
use normalize::NormalizeRequest;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Run one normalize invocation for a flow: load staged batches into the
/// raw table, materialize destination tables, and advance the flow's
/// normalize pointer.
#[derive(Debug, Parser)]
#[command(about, version)]
struct Cli {
    /// Flow to normalize.
    #[arg(long, env = "PEERDB_FLOW_JOB_NAME")]
    flow_job_name: String,
    /// Normalize no further than this sync batch. Zero means everything
    /// synced so far.
    #[arg(long, default_value_t = 0)]
    sync_batch_id: i64,
    /// Postgres catalog to read flow state from.
    #[arg(long, env = "PEERDB_CATALOG_URL")]
    catalog_url: String,
    /// ClickHouse HTTP(S) endpoint.
    #[arg(long, env = "PEERDB_CLICKHOUSE_URL")]
    clickhouse_url: url::Url,
    #[arg(long, env = "PEERDB_CLICKHOUSE_DATABASE")]
    clickhouse_database: String,
    #[arg(long, env = "PEERDB_CLICKHOUSE_USER", default_value = "default")]
    clickhouse_user: String,
    #[arg(long, env = "PEERDB_CLICKHOUSE_PASSWORD")]
    clickhouse_password: Option<String>,
    /// Directory holding staged Avro batches.
    #[arg(long, env = "PEERDB_STAGE_ROOT")]
    stage_root: PathBuf,
    /// JSON file with the flow's table mappings, schemas, and environment.
    #[arg(long)]
    flow_spec: PathBuf,
    /// Create the raw table and all normalized tables before normalizing.
    #[arg(long)]
    setup_tables: bool,
}

/// On-disk companion of a flow: what the orchestrator would otherwise pass.
/// Omitted table schemas fall back to the catalog's latest snapshot.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowSpec {
    table_mappings: Vec<TableMapping>,
    #[serde(default)]
    table_schemas: BTreeMap<String, TableSchema>,
    #[serde(default)]
    env: Env,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let spec: FlowSpec = serde_json::from_slice(
        &tokio::fs::read(&cli.flow_spec)
            .await
            .with_context(|| format!("reading flow spec {:?}", cli.flow_spec))?,
    )
    .context("parsing flow spec")?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&cli.catalog_url)
        .await
        .context("connecting to the catalog")?;
    let catalog = catalog_sql::PgCatalog::new(pool);

    let mut table_schemas = spec.table_schemas;
    if table_schemas.is_empty() {
        let snapshot =
            catalog_sql::schema_snapshots::fetch_latest(&cli.flow_job_name, catalog.pool())
                .await
                .context("fetching schema snapshot")?
                .with_context(|| {
                    format!(
                        "flow spec has no table schemas and flow {} has no snapshot",
                        cli.flow_job_name
                    )
                })?;
        tracing::info!(
            batch_id = snapshot.batch_id,
            "using schema snapshot from catalog"
        );
        table_schemas = snapshot.payload.0;
    }

    let database = cli.clickhouse_database.clone();
    let destination = ClickHouseDestination::new(ClickHouseConfig {
        url: cli.clickhouse_url.clone(),
        database: cli.clickhouse_database.clone(),
        user: cli.clickhouse_user.clone(),
        password: cli.clickhouse_password.clone(),
    });
    let stage_store = stage::LocalStageStore::new(&cli.stage_root);

    let request = NormalizeRequest {
        flow_job_name: cli.flow_job_name.clone(),
        sync_batch_id: cli.sync_batch_id,
        table_mappings: spec.table_mappings,
        table_schemas,
        env: spec.env,
    };

    if cli.setup_tables {
        catalog_sql::flow_state::upsert_flow(&cli.flow_job_name, catalog.pool())
            .await
            .context("registering flow")?;
        setup_tables(&destination, &database, &request).await?;
    }

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling invocation");
                token.cancel();
            }
        }
    });

    match normalize::normalize(&catalog, &destination, &stage_store, &request, &token).await {
        Ok(range) => {
            println!("{}", serde_json::to_string(&range)?);
            Ok(())
        }
        Err(error) => {
            tracing::error!(
                error = %error,
                class = ?error.class(),
                action = ?error.action(),
                "normalize failed"
            );
            Err(error.into())
        }
    }
}

async fn setup_tables(
    destination: &ClickHouseDestination,
    database: &str,
    request: &NormalizeRequest,
) -> anyhow::Result<()> {
    let client = destination.shared();
    normalize::raw::setup_raw_table(client.as_ref(), &request.flow_job_name).await?;

    for mapping in &request.table_mappings {
        let schema = request
            .table_schemas
            .get(&mapping.source_table)
            .with_context(|| format!("no schema for source table {}", mapping.source_table))?;
        let project = normalize::project::project(mapping, schema, &request.env)?;
        normalize::setup_normalized_table(client.as_ref(), &project, database, false).await?;
    }
    Ok(())
}
