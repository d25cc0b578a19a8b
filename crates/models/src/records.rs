use serde::{Deserialize, Serialize};

/// The kind of source change a raw record carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    Insert = 0,
    Update = 1,
    Delete = 2,
}

impl RecordType {
    pub fn from_wire(value: i64) -> Result<Self, UnknownRecordType> {
        match value {
            0 => Ok(Self::Insert),
            1 => Ok(Self::Update),
            2 => Ok(Self::Delete),
            other => Err(UnknownRecordType(other)),
        }
    }

    pub fn as_wire(&self) -> i64 {
        *self as i64
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unknown record type {0} (expected 0, 1, or 2)")]
pub struct UnknownRecordType(pub i64);

/// One source change event, as staged by the sync stage and landed in the
/// raw table. Serialized field names are the raw-table column names and may
/// never change: existing staged files and deployments depend on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "_peerdb_uid")]
    pub uid: String,
    #[serde(rename = "_peerdb_timestamp")]
    pub timestamp: i64,
    #[serde(rename = "_peerdb_destination_table_name")]
    pub destination_table_name: String,
    /// JSON post-image for inserts and updates; key-only image for deletes.
    #[serde(rename = "_peerdb_data")]
    pub data: String,
    /// JSON pre-image of an update, or empty.
    #[serde(rename = "_peerdb_match_data", default)]
    pub match_data: String,
    #[serde(rename = "_peerdb_batch_id")]
    pub batch_id: i64,
    #[serde(rename = "_peerdb_record_type")]
    pub record_type: i64,
    /// Comma-joined names of TOAST columns left unchanged by an update.
    #[serde(rename = "_peerdb_unchanged_toast_columns", default)]
    pub unchanged_toast_columns: String,
}
