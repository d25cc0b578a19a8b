//! CDC normalization for a columnar destination: materializes the per-flow
//! raw change log into versioned, soft-deleting destination tables.

pub mod coerce;
pub mod coordinator;
pub mod ddl;
mod error;
pub mod execute;
pub mod plan;
pub mod project;
pub mod raw;

pub use coordinator::{normalize, BatchRange, NormalizeRequest};
pub use ddl::setup_normalized_table;
pub use error::{Error, ErrorAction, ErrorClass};
pub use plan::Plan;
pub use project::{ColumnProject, TableProject};
