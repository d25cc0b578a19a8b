use serde::Serialize;

/// Coarse error classification, attached to every error that crosses the
/// engine boundary so the alerter can route it without parsing messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    TransientNetwork,
    SchemaDrift,
    UnknownTable,
    MalformedStage,
    PlanExecution,
    Cancelled,
}

/// What the caller should do about an error of a given class.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorAction {
    /// Retry the whole invocation; progress pointers are unchanged.
    Retry,
    /// The affected table was skipped; the invocation continued.
    Skip,
    /// Notify humans; retrying without intervention will fail again.
    Alert,
    /// Stop cleanly without retrying or alerting.
    Stop,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("catalog access failed for flow {flow_job_name}")]
    Catalog {
        flow_job_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("destination access failed for flow {flow_job_name}")]
    Destination {
        flow_job_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("stage load failed for flow {flow_job_name}, window ({start}, {end}]")]
    Stage {
        flow_job_name: String,
        start: i64,
        end: i64,
        #[source]
        source: stage::Error,
    },

    #[error("column {column} of table {table} is not present in the source schema")]
    SchemaDrift { table: String, column: String },

    #[error("ordering column {column} of table {table} is not a projectable source column")]
    UnknownOrderingColumn { table: String, column: String },

    #[error("source table {source_table} of {table} has no schema snapshot")]
    MissingSchema {
        table: String,
        source_table: String,
    },

    #[error("table {table} appears in the raw window of flow {flow_job_name} but has no mapping")]
    UnknownTable {
        flow_job_name: String,
        table: String,
    },

    #[error("normalize plan failed for flow {flow_job_name}, table {table}, window ({start}, {end}]")]
    Plan {
        flow_job_name: String,
        table: String,
        start: i64,
        end: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("normalize cancelled for flow {flow_job_name}")]
    Cancelled { flow_job_name: String },
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Catalog { .. } | Error::Destination { .. } => ErrorClass::TransientNetwork,
            Error::Stage { source, .. } => match source {
                stage::Error::Malformed { .. } => ErrorClass::MalformedStage,
                stage::Error::Cancelled => ErrorClass::Cancelled,
                _ => ErrorClass::TransientNetwork,
            },
            Error::SchemaDrift { .. }
            | Error::UnknownOrderingColumn { .. }
            | Error::MissingSchema { .. } => ErrorClass::SchemaDrift,
            Error::UnknownTable { .. } => ErrorClass::UnknownTable,
            Error::Plan { .. } => ErrorClass::PlanExecution,
            Error::Cancelled { .. } => ErrorClass::Cancelled,
        }
    }

    pub fn action(&self) -> ErrorAction {
        match self.class() {
            ErrorClass::TransientNetwork | ErrorClass::PlanExecution => ErrorAction::Retry,
            ErrorClass::SchemaDrift | ErrorClass::UnknownTable => ErrorAction::Skip,
            ErrorClass::MalformedStage => ErrorAction::Alert,
            ErrorClass::Cancelled => ErrorAction::Stop,
        }
    }
}
