mod loader;
mod schema;
mod store;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

pub use loader::{load_window, LoadSummary};
pub use schema::{raw_record_schema, read_batch, write_batch};
pub use store::{LocalStageStore, StageStore, StagedFile};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A staged file that cannot be decoded, or whose rows disagree with
    /// its batch address. Fatal for the invocation; the file must be
    /// re-staged before normalization can proceed.
    #[error("staged file {file} of batch {batch_id} is malformed: {detail}")]
    Malformed {
        file: String,
        batch_id: i64,
        detail: String,
    },
    #[error("listing staged files for batch {batch_id}")]
    Store {
        batch_id: i64,
        #[source]
        source: anyhow::Error,
    },
    #[error("loading batch {batch_id} into the raw table")]
    Destination {
        batch_id: i64,
        #[source]
        source: anyhow::Error,
    },
    #[error("stage load cancelled")]
    Cancelled,
}
