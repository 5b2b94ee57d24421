// sra2bq-warehouse - BigQuery load jobs, table metadata and verification
// queries behind a trait seam.
//
// The `Warehouse` trait is what pipelines program against; `BigQueryWarehouse`
// is the production implementation. Tests substitute their own.

use async_trait::async_trait;

mod bigquery;
mod error;
pub mod verify;

pub use bigquery::BigQueryWarehouse;
pub use error::WarehouseError;

/// Destination table coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }

    /// `project.dataset.table`
    pub fn fqn(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }

    /// Backtick-quoted form for use inside SQL text.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.fqn())
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

/// Column type vocabulary for explicit load schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Int64,
    Float64,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: ColumnType::String,
        }
    }
}

/// Source format details for a load job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFormat {
    Csv {
        delimiter: char,
        skip_leading_rows: i64,
        allow_quoted_newlines: bool,
        null_marker: Option<String>,
        /// Staged objects are gzip members; the service detects this from
        /// the object itself, the flag is carried for reporting.
        gzip: bool,
    },
    Parquet,
}

/// One warehouse load: staged inputs, destination, format, schema policy.
/// Every load runs with CREATE_IF_NEEDED + WRITE_TRUNCATE, replacing the
/// destination's full contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    pub source_uris: Vec<String>,
    pub destination: TableId,
    pub format: SourceFormat,
    /// Explicit schema; the service autodetects when `None`.
    pub schema: Option<Vec<ColumnSpec>>,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub job_id: String,
}

#[derive(Debug, Clone)]
pub struct TableStats {
    pub row_count: u64,
    pub logical_bytes: u64,
    pub created: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Issue a load job and block until it completes, fails or times out.
    async fn run_load(&self, spec: &LoadSpec) -> Result<LoadOutcome, WarehouseError>;

    /// Row count and size metadata for a table.
    async fn table_stats(&self, table: &TableId) -> Result<TableStats, WarehouseError>;

    /// Single-row aggregate query; returns the named INT64 columns in order.
    async fn counts(&self, sql: &str, columns: &[&str]) -> Result<Vec<i64>, WarehouseError>;

    /// Up to `limit` rows of the table, each rendered as a JSON object
    /// string.
    async fn sample_rows(&self, table: &TableId, limit: usize)
        -> Result<Vec<String>, WarehouseError>;
}
