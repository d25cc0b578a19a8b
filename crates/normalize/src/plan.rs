//! One `INSERT ... SELECT` per (destination table, part).

use crate::project::{ColumnProject, TableProject};
use destination::quote_backtick as quote;
use itertools::Itertools;
use models::{raw_columns, synthesized_columns, BinaryFormat, Env, LogicalType};

/// A single normalize statement, covering one hash partition of one
/// destination table's raw rows in the batch window.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub destination_table: String,
    pub part: u32,
    pub parts: u32,
    pub sql: String,
}

/// Build the plans for one destination table over `(start, end]`.
pub fn build_plans(
    project: &TableProject,
    raw_table: &str,
    start: i64,
    end: i64,
    env: &Env,
) -> Vec<Plan> {
    let parts = env.normalization_parts();
    (0..parts)
        .map(|part| Plan {
            destination_table: project.destination_table.clone(),
            part,
            parts,
            sql: insert_select_sql(project, raw_table, start, end, part, parts, env),
        })
        .collect()
}

fn insert_select_sql(
    project: &TableProject,
    raw_table: &str,
    start: i64,
    end: i64,
    part: u32,
    parts: u32,
    env: &Env,
) -> String {
    let insert_columns = project
        .columns
        .iter()
        .map(|c| quote(&c.destination_name))
        .chain([
            quote(synthesized_columns::IS_DELETED),
            quote(synthesized_columns::VERSION),
        ])
        .join(", ");

    let mut predicate = format!(
        "{batch} > {start} AND {batch} <= {end} AND {dest} = {table}",
        batch = quote(raw_columns::BATCH_ID),
        dest = quote(raw_columns::DESTINATION_TABLE_NAME),
        table = string_literal(&project.destination_table),
    );
    if parts > 1 {
        // Hash partitioning makes the per-part input sets disjoint; their
        // union is exactly the single-part input.
        predicate = format!(
            "{predicate} AND cityHash64({uid}) % {parts} = {part}",
            uid = quote(raw_columns::UID),
        );
    }

    let projection = select_branch(
        project,
        raw_columns::DATA,
        &format!(
            "intDiv({record_type}, 2) AS {is_deleted}, {timestamp} AS {version}",
            record_type = quote(raw_columns::RECORD_TYPE),
            timestamp = quote(raw_columns::TIMESTAMP),
            is_deleted = quote(synthesized_columns::IS_DELETED),
            version = quote(synthesized_columns::VERSION),
        ),
        env,
    );

    let mut sql = format!(
        "INSERT INTO {table} ({insert_columns}) SELECT {projection} FROM {raw} WHERE {predicate}",
        table = quote(&project.destination_table),
        raw = quote(raw_table),
    );

    if env.enable_primary_update() {
        // An update that moves a row across primary keys must tombstone the
        // old key. The pre-image branch carries version `timestamp - 1` so
        // the tombstone always orders before the new image.
        let tombstone = select_branch(
            project,
            raw_columns::MATCH_DATA,
            &format!(
                "1 AS {is_deleted}, {timestamp} - 1 AS {version}",
                timestamp = quote(raw_columns::TIMESTAMP),
                is_deleted = quote(synthesized_columns::IS_DELETED),
                version = quote(synthesized_columns::VERSION),
            ),
            env,
        );
        sql = format!(
            "{sql} UNION ALL SELECT {tombstone} FROM {raw} WHERE {predicate} \
             AND {record_type} = 1 AND {match_data} != ''",
            raw = quote(raw_table),
            record_type = quote(raw_columns::RECORD_TYPE),
            match_data = quote(raw_columns::MATCH_DATA),
        );
    }

    sql
}

fn select_branch(
    project: &TableProject,
    data_column: &str,
    synthesized: &str,
    env: &Env,
) -> String {
    project
        .columns
        .iter()
        .map(|column| {
            format!(
                "{expr} AS {name}",
                expr = column_expr(column, data_column, env),
                name = quote(&column.destination_name),
            )
        })
        .chain([synthesized.to_string()])
        .join(", ")
}

/// The extraction expression of one column from a raw JSON document.
/// Temporal and bytes columns get dedicated pipelines; everything else is
/// typed JSON extraction against the physical type.
fn column_expr(column: &ColumnProject, data_column: &str, env: &Env) -> String {
    let data = quote(data_column);
    let field = string_literal(&column.source_name);

    if !column.type_overridden {
        if column.logical_type.is_temporal() {
            // Millisecond best-effort: a malformed temporal value becomes
            // NULL rather than failing the whole batch.
            return format!(
                "parseDateTime64BestEffortOrNull(JSONExtractString({data}, {field}), 3)"
            );
        }
        if column.logical_type == LogicalType::Bytes {
            return match env.binary_format() {
                BinaryFormat::Raw => {
                    format!("base64Decode(JSONExtractString({data}, {field}))")
                }
                BinaryFormat::Hex => {
                    format!("hex(base64Decode(JSONExtractString({data}, {field})))")
                }
            };
        }
    }

    format!(
        "JSONExtract({data}, {field}, {typ})",
        typ = string_literal(&column.physical_type),
    )
}

fn string_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}
