//! Destination table DDL.

use crate::project::TableProject;
use destination::quote_backtick as quote;
use itertools::Itertools;
use models::synthesized_columns;

pub fn create_table_sql(project: &TableProject, is_resync: bool) -> String {
    let create = if is_resync {
        // Resync rebuilds the table from scratch under the same name.
        "CREATE OR REPLACE TABLE"
    } else {
        "CREATE TABLE IF NOT EXISTS"
    };

    let mut columns: Vec<String> = project
        .columns
        .iter()
        .map(|c| format!("{} {}", quote(&c.destination_name), c.physical_type))
        .collect();
    columns.push(format!("{} Int8", quote(synthesized_columns::IS_DELETED)));
    columns.push(format!("{} Int64", quote(synthesized_columns::VERSION)));
    if project.synced_at {
        columns.push(format!(
            "{} DateTime64(9) DEFAULT now64()",
            quote(synthesized_columns::SYNCED_AT)
        ));
    }

    let engine = if project.replacing_engine {
        format!(
            "ReplacingMergeTree({})",
            quote(synthesized_columns::VERSION)
        )
    } else {
        "MergeTree()".to_string()
    };

    let order_by = if project.ordering_keys.is_empty() {
        "tuple()".to_string()
    } else {
        format!(
            "({})",
            project.ordering_keys.iter().map(|k| quote(k)).join(", ")
        )
    };

    let mut sql = format!(
        "{create} {table} ({columns}) ENGINE = {engine} ORDER BY {order_by}",
        table = quote(&project.destination_table),
        columns = columns.join(", "),
    );

    // ClickHouse rejects Nullable ordering-key columns unless told otherwise,
    // which happens whenever the flow-wide nullable lift is on.
    let nullable_key = project.ordering_keys.iter().any(|key| {
        project
            .column(key)
            .is_some_and(|c| c.physical_type.starts_with("Nullable("))
    });
    if nullable_key {
        sql.push_str(" SETTINGS allow_nullable_key = 1");
    }

    sql
}

/// Create the normalized table, reporting whether it already existed.
pub async fn setup_normalized_table(
    client: &dyn destination::Client,
    project: &TableProject,
    database: &str,
    is_resync: bool,
) -> anyhow::Result<bool> {
    let already_existed = client
        .check_table_exists(database, &project.destination_table)
        .await?;
    client
        .execute(&create_table_sql(project, is_resync))
        .await?;

    tracing::info!(
        table = project.destination_table,
        already_existed,
        is_resync,
        "set up normalized table"
    );
    Ok(already_existed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::project::project;
    use models::{ColumnSchema, ColumnSetting, Env, LogicalType, TableMapping, TableSchema};

    fn schema() -> TableSchema {
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
        ])
    }

    fn project_for(mapping: &TableMapping, env: &Env) -> TableProject {
        project(mapping, &schema(), env).unwrap()
    }

    #[test]
    fn test_basic_ddl() {
        let project = project_for(&TableMapping::new("public.users", "users"), &Env::default());
        insta::assert_snapshot!(create_table_sql(&project, false), @"CREATE TABLE IF NOT EXISTS `users` (`id` Int64, `v` Nullable(String), `_peerdb_is_deleted` Int8, `_peerdb_version` Int64) ENGINE = ReplacingMergeTree(`_peerdb_version`) ORDER BY (`id`)");
    }

    #[test]
    fn test_resync_replaces() {
        let project = project_for(&TableMapping::new("public.users", "users"), &Env::default());
        assert!(create_table_sql(&project, true).starts_with("CREATE OR REPLACE TABLE `users`"));
    }

    #[test]
    fn test_forced_merge_engine() {
        let mut mapping = TableMapping::new("public.users", "users");
        mapping.force_merge_engine = true;
        let project = project_for(&mapping, &Env::default());
        assert!(create_table_sql(&project, false).contains("ENGINE = MergeTree()"));
    }

    #[test]
    fn test_excluded_pk_degenerates_to_unit_tuple() {
        let mut mapping = TableMapping::new("public.users", "users");
        mapping.exclude.insert("id".to_string());
        let project = project_for(&mapping, &Env::default());

        let sql = create_table_sql(&project, false);
        assert!(sql.contains("ORDER BY tuple()"));
        assert!(!sql.contains("`id`"));
    }

    #[test]
    fn test_renamed_ordering_key() {
        let mut mapping = TableMapping::new("public.users", "users");
        mapping.columns.push(ColumnSetting {
            source_name: "id".to_string(),
            destination_name: Some("pk".to_string()),
            destination_type: None,
            ordering: 1,
        });
        let project = project_for(&mapping, &Env::default());

        let sql = create_table_sql(&project, false);
        assert!(sql.contains("ORDER BY (`pk`)"));
        assert!(sql.contains("`pk` Int64"));
    }

    #[test]
    fn test_synced_at_column_default() {
        let mut mapping = TableMapping::new("public.users", "users");
        mapping.synced_at = true;
        let project = project_for(&mapping, &Env::default());
        assert!(create_table_sql(&project, false)
            .contains("`_peerdb_synced_at` DateTime64(9) DEFAULT now64()"));
    }

    #[test]
    fn test_nullable_ordering_key_needs_setting() {
        let mut env = Env::default();
        env.set(models::env_keys::NULLABLE, "true");
        let project = project_for(&TableMapping::new("public.users", "users"), &env);

        let sql = create_table_sql(&project, false);
        assert!(sql.contains("`id` Nullable(Int64)"));
        assert!(sql.ends_with("SETTINGS allow_nullable_key = 1"));
    }

    #[tokio::test]
    async fn test_setup_reports_preexisting_table() {
        let client = destination::mock::MockClient::new();
        let project = project_for(&TableMapping::new("public.users", "users"), &Env::default());

        assert!(!setup_normalized_table(&client, &project, "db", false)
            .await
            .unwrap());

        client.add_existing_table("db", "users");
        assert!(setup_normalized_table(&client, &project, "db", false)
            .await
            .unwrap());

        let statements = client.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS `users`"));
    }
}
