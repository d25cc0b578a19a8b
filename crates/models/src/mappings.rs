use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-column overrides within a TableMapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSetting {
    /// The source column this setting applies to.
    pub source_name: String,
    /// Renames the column in the destination. Applies uniformly to
    /// projections, primary keys, and ordering keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    /// A verbatim destination type, bypassing coercion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_type: Option<String>,
    /// When > 0, this column participates in the destination ordering key,
    /// positioned by ascending value. Zero means unordered.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ordering: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// A source-table to destination-table binding within a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMapping {
    pub source_table: String,
    pub destination_table: String,
    /// Source columns dropped from the destination entirely.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnSetting>,
    /// Use a plain merge engine instead of replacing-by-version.
    #[serde(default, skip_serializing_if = "is_false")]
    pub force_merge_engine: bool,
    /// Add a load-time-defaulted `_peerdb_synced_at` column.
    #[serde(default, skip_serializing_if = "is_false")]
    pub synced_at: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl TableMapping {
    pub fn new(source_table: &str, destination_table: &str) -> Self {
        Self {
            source_table: source_table.to_string(),
            destination_table: destination_table.to_string(),
            exclude: BTreeSet::new(),
            columns: Vec::new(),
            force_merge_engine: false,
            synced_at: false,
        }
    }

    pub fn setting(&self, source_name: &str) -> Option<&ColumnSetting> {
        self.columns.iter().find(|c| c.source_name == source_name)
    }

    /// The destination name of a source column, after any rename.
    pub fn destination_name_of<'a>(&'a self, source_name: &'a str) -> &'a str {
        self.setting(source_name)
            .and_then(|c| c.destination_name.as_deref())
            .unwrap_or(source_name)
    }

    pub fn is_excluded(&self, source_name: &str) -> bool {
        self.exclude.contains(source_name)
    }
}
