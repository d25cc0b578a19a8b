use apache_avro::{Codec, Reader, Schema, Writer};
use models::RawRecord;

// The Avro schema of staged raw records. Field names are the raw-table
// column names; changing either breaks files already staged by deployments.
const RAW_RECORD_SCHEMA_JSON: &str = r#"
{
    "type": "record",
    "name": "peerdb_raw_record",
    "fields": [
        {"name": "_peerdb_uid", "type": "string"},
        {"name": "_peerdb_timestamp", "type": "long"},
        {"name": "_peerdb_destination_table_name", "type": "string"},
        {"name": "_peerdb_data", "type": "string"},
        {"name": "_peerdb_match_data", "type": "string", "default": ""},
        {"name": "_peerdb_batch_id", "type": "long"},
        {"name": "_peerdb_record_type", "type": "long"},
        {"name": "_peerdb_unchanged_toast_columns", "type": "string", "default": ""}
    ]
}
"#;

lazy_static::lazy_static! {
    static ref RAW_RECORD_SCHEMA: Schema =
        Schema::parse_str(RAW_RECORD_SCHEMA_JSON).expect("raw record schema parses");
}

pub fn raw_record_schema() -> &'static Schema {
    &RAW_RECORD_SCHEMA
}

/// Encode records into one staged Avro object-container file.
/// Used by the sync stage and by test fixtures; `read_batch` is its inverse.
pub fn write_batch(records: &[RawRecord]) -> Result<Vec<u8>, apache_avro::Error> {
    let mut writer = Writer::with_codec(raw_record_schema(), Vec::new(), Codec::Snappy);
    for record in records {
        writer.append_ser(record)?;
    }
    writer.into_inner()
}

/// Decode one staged Avro file back into raw records.
pub fn read_batch(bytes: &[u8]) -> Result<Vec<RawRecord>, apache_avro::Error> {
    let reader = Reader::new(bytes)?;
    let mut records = Vec::new();
    for value in reader {
        records.push(apache_avro::from_value(&value?)?);
    }
    Ok(records)
}
