use serde::{Deserialize, Serialize};

/// Source-side logical column types, as captured in schema snapshots.
/// This is the domain of the type-coercion table; destinations map each
/// variant to a physical type of their own dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicalType {
    SmallInt,
    Integer,
    BigInt,
    Numeric {
        #[serde(skip_serializing_if = "Option::is_none")]
        precision: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        scale: Option<u32>,
    },
    Real,
    Double,
    Boolean,
    Text,
    Bytes,
    Uuid,
    Json,
    Date,
    /// Timestamp without time zone.
    Timestamp,
    /// Timestamp with time zone, normalized to UTC.
    TimestampTz,
    Interval,
    /// An array of a scalar element type.
    Array(Box<LogicalType>),
}

impl LogicalType {
    pub fn is_array(&self) -> bool {
        matches!(self, LogicalType::Array(_))
    }

    /// Whether values of this type are JSON-encoded as temporal strings
    /// requiring best-effort parsing on load.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            LogicalType::Date | LogicalType::Timestamp | LogicalType::TimestampTz
        )
    }
}

/// One column of a source table's schema snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

/// An ordered snapshot of a source table's columns. Snapshots are immutable
/// per batch; sync produces a new one when it absorbs a DDL event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Source primary-key columns, in declaration order.
    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}
