//! Resolution of a table mapping against its source schema.

use crate::{coerce, Error};
use models::{Env, LogicalType, TableMapping, TableSchema};

/// One destination column of a projected table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProject {
    pub source_name: String,
    pub destination_name: String,
    /// Physical destination type: an explicit mapping override verbatim,
    /// or the coerced source logical type.
    pub physical_type: String,
    pub logical_type: LogicalType,
    /// Whether an explicit destination type bypassed coercion.
    pub type_overridden: bool,
}

/// The resolved plan of one destination table: what the planner projects,
/// what the DDL declares, and how the engine orders and merges rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableProject {
    pub destination_table: String,
    /// Destination columns, in source declaration order.
    pub columns: Vec<ColumnProject>,
    /// Destination names of the source primary keys, excluded ones dropped.
    pub primary_keys: Vec<String>,
    /// Destination names forming the engine ordering key. May be empty, in
    /// which case the table degenerates to a unit ordering tuple.
    pub ordering_keys: Vec<String>,
    /// Replacing-by-version engine, unless the mapping forces plain merge.
    pub replacing_engine: bool,
    pub synced_at: bool,
}

impl TableProject {
    pub fn column(&self, destination_name: &str) -> Option<&ColumnProject> {
        self.columns
            .iter()
            .find(|c| c.destination_name == destination_name)
    }
}

/// Merge a mapping and its source schema into a table plan. Pure; all
/// drift policy lives here: unknown excluded columns are ignored (the
/// source may have dropped them), unknown ordering columns are fatal, and
/// any other column setting naming a column the source no longer has is a
/// drift error that skips this table's plan.
pub fn project(
    mapping: &TableMapping,
    schema: &TableSchema,
    env: &Env,
) -> Result<TableProject, Error> {
    let lift_nullable = env.nullable();

    for setting in &mapping.columns {
        // A stale rename or type override cannot be applied or dropped
        // silently; surface it so the coordinator skips this table.
        // Ordering settings get the more specific error below.
        if setting.ordering == 0 && schema.column(&setting.source_name).is_none() {
            return Err(Error::SchemaDrift {
                table: mapping.destination_table.clone(),
                column: setting.source_name.clone(),
            });
        }
    }

    let mut columns = Vec::new();
    for column in &schema.columns {
        if mapping.is_excluded(&column.name) {
            continue;
        }
        let setting = mapping.setting(&column.name);
        let override_type = setting.and_then(|s| s.destination_type.clone());
        let physical_type = match &override_type {
            Some(explicit) => explicit.clone(),
            None => coerce::physical_type(&column.logical_type, column.nullable || lift_nullable),
        };
        columns.push(ColumnProject {
            source_name: column.name.clone(),
            destination_name: mapping.destination_name_of(&column.name).to_string(),
            physical_type,
            logical_type: column.logical_type.clone(),
            type_overridden: override_type.is_some(),
        });
    }

    let primary_keys: Vec<String> = schema
        .primary_keys()
        .filter(|c| !mapping.is_excluded(&c.name))
        .map(|c| mapping.destination_name_of(&c.name).to_string())
        .collect();

    let mut ordered: Vec<&models::ColumnSetting> = mapping
        .columns
        .iter()
        .filter(|s| s.ordering > 0)
        .collect();
    ordered.sort_by_key(|s| s.ordering);

    let ordering_keys = if ordered.is_empty() {
        primary_keys.clone()
    } else {
        let mut keys = Vec::new();
        for setting in ordered {
            // An ordering column must survive into the destination.
            if schema.column(&setting.source_name).is_none()
                || mapping.is_excluded(&setting.source_name)
            {
                return Err(Error::UnknownOrderingColumn {
                    table: mapping.destination_table.clone(),
                    column: setting.source_name.clone(),
                });
            }
            keys.push(mapping.destination_name_of(&setting.source_name).to_string());
        }
        keys
    };

    Ok(TableProject {
        destination_table: mapping.destination_table.clone(),
        columns,
        primary_keys,
        ordering_keys,
        replacing_engine: !mapping.force_merge_engine,
        synced_at: mapping.synced_at,
    })
}
