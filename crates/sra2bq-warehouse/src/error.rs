//! Error types for warehouse operations

use gcp_bigquery_client::error::BQError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The service completed the job with an error; `details` is the
    /// job-level error list, surfaced before the run terminates.
    #[error("Load job '{job_id}' failed: {reason}")]
    JobFailed {
        job_id: String,
        reason: String,
        details: Vec<String>,
    },

    /// The bounded wait on the load job expired.
    #[error("Load job '{job_id}' did not complete within {waited_secs}s (cancel requested: {cancelled})")]
    Timeout {
        job_id: String,
        waited_secs: u64,
        cancelled: bool,
    },

    /// The service accepted the job but returned no job reference to poll.
    #[error("Load job was accepted but returned no job reference")]
    MissingJobReference,

    #[error("Query returned no rows: {sql}")]
    EmptyResult { sql: String },

    #[error(transparent)]
    Client(#[from] BQError),
}

impl WarehouseError {
    /// Job-level error details, when the variant carries any.
    pub fn details(&self) -> &[String] {
        match self {
            WarehouseError::JobFailed { details, .. } => details,
            _ => &[],
        }
    }
}
