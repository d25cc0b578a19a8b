mod env;
mod mappings;
mod records;
mod schemas;

pub use env::{keys as env_keys, BinaryFormat, Env};
pub use mappings::{ColumnSetting, TableMapping};
pub use records::{RawRecord, RecordType};
pub use schemas::{ColumnSchema, LogicalType, TableSchema};

/// Names of the raw-table columns, in declaration order. These are part of
/// the wire surface shared with the sync stage: staged Avro files and raw
/// rows use exactly these field names.
pub mod raw_columns {
    pub const UID: &str = "_peerdb_uid";
    pub const TIMESTAMP: &str = "_peerdb_timestamp";
    pub const DESTINATION_TABLE_NAME: &str = "_peerdb_destination_table_name";
    pub const DATA: &str = "_peerdb_data";
    pub const MATCH_DATA: &str = "_peerdb_match_data";
    pub const BATCH_ID: &str = "_peerdb_batch_id";
    pub const RECORD_TYPE: &str = "_peerdb_record_type";
    pub const UNCHANGED_TOAST_COLUMNS: &str = "_peerdb_unchanged_toast_columns";

    pub const ALL: &[&str] = &[
        UID,
        TIMESTAMP,
        DESTINATION_TABLE_NAME,
        DATA,
        MATCH_DATA,
        BATCH_ID,
        RECORD_TYPE,
        UNCHANGED_TOAST_COLUMNS,
    ];
}

/// Names of columns synthesized into every normalized table.
pub mod synthesized_columns {
    pub const IS_DELETED: &str = "_peerdb_is_deleted";
    pub const VERSION: &str = "_peerdb_version";
    pub const SYNCED_AT: &str = "_peerdb_synced_at";
}
