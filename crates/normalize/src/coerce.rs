//! Source logical types to ClickHouse physical types.

use models::LogicalType;

// ClickHouse Decimal tops out at precision 76; unbounded source numerics
// land on the widest representation that still leaves a usable scale.
const DEFAULT_NUMERIC_PRECISION: u32 = 76;
const DEFAULT_NUMERIC_SCALE: u32 = 38;

/// The physical destination type of a column. `nullable` is the effective
/// nullability: the column's own, or lifted flow-wide by configuration.
/// Arrays are never wrapped, ClickHouse has no `Nullable(Array)`.
pub fn physical_type(logical: &LogicalType, nullable: bool) -> String {
    let base = base_type(logical);
    if nullable && !logical.is_array() {
        format!("Nullable({base})")
    } else {
        base
    }
}

fn base_type(logical: &LogicalType) -> String {
    match logical {
        LogicalType::SmallInt => "Int16".to_string(),
        LogicalType::Integer => "Int32".to_string(),
        LogicalType::BigInt => "Int64".to_string(),
        LogicalType::Numeric { precision, scale } => match (precision, scale) {
            (Some(p), Some(s)) => format!("Decimal({p}, {s})"),
            // A declared precision without a scale means scale zero.
            (Some(p), None) => format!("Decimal({p}, 0)"),
            (None, _) => format!(
                "Decimal({DEFAULT_NUMERIC_PRECISION}, {DEFAULT_NUMERIC_SCALE})"
            ),
        },
        LogicalType::Real => "Float32".to_string(),
        LogicalType::Double => "Float64".to_string(),
        LogicalType::Boolean => "Bool".to_string(),
        LogicalType::Text | LogicalType::Bytes | LogicalType::Json | LogicalType::Interval => {
            "String".to_string()
        }
        LogicalType::Uuid => "UUID".to_string(),
        LogicalType::Date => "Date32".to_string(),
        LogicalType::Timestamp => "DateTime64(3)".to_string(),
        LogicalType::TimestampTz => "DateTime64(3, 'UTC')".to_string(),
        LogicalType::Array(element) => format!("Array({})", base_type(element)),
    }
}
