// BigQuery implementation of the Warehouse trait.
//
// Load jobs are submitted through the REST API and polled at a fixed
// interval. The wait is bounded: on expiry the job is cancelled (best
// effort) and the step fails with a Timeout error.

use crate::{
    ColumnSpec, ColumnType, LoadOutcome, LoadSpec, SourceFormat, TableId, TableStats, Warehouse,
    WarehouseError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::model::error_proto::ErrorProto;
use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::model::job_configuration::JobConfiguration;
use gcp_bigquery_client::model::job_configuration_load::JobConfigurationLoad;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::query_response::ResultSet;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::model::table_reference::TableReference;
use gcp_bigquery_client::model::table_schema::TableSchema;
use gcp_bigquery_client::Client;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct BigQueryWarehouse {
    client: Client,
    project: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl BigQueryWarehouse {
    /// Connect with a service-account key file, or application-default
    /// credentials when no key is given.
    pub async fn connect(
        project: &str,
        credentials: Option<&Path>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, WarehouseError> {
        let client = match credentials {
            Some(path) => {
                info!("Authenticating with service account key: {}", path.display());
                ClientBuilder::new()
                    .build_from_service_account_key_file(&path.to_string_lossy())
                    .await?
            }
            None => {
                info!("Authenticating with application-default credentials");
                ClientBuilder::new()
                    .build_from_application_default_credentials()
                    .await?
            }
        };

        Ok(Self {
            client,
            project: project.to_string(),
            poll_interval,
            timeout,
        })
    }

    async fn query(&self, sql: &str) -> Result<ResultSet, WarehouseError> {
        let response = self
            .client
            .job()
            .query(&self.project, QueryRequest::new(sql))
            .await?;
        Ok(ResultSet::new_from_query_response(response))
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn run_load(&self, spec: &LoadSpec) -> Result<LoadOutcome, WarehouseError> {
        let job = build_load_job(spec);

        info!(
            table = %spec.destination,
            sources = spec.source_uris.len(),
            "Submitting load job"
        );
        let inserted = self.client.job().insert(&self.project, job).await?;

        let reference = inserted
            .job_reference
            .ok_or(WarehouseError::MissingJobReference)?;
        let job_id = reference.job_id.ok_or(WarehouseError::MissingJobReference)?;
        let location = reference.location;

        info!(job_id = %job_id, "Load job started, waiting for completion...");

        let started = Instant::now();
        loop {
            let job = self
                .client
                .job()
                .get_job(&self.project, &job_id, location.as_deref())
                .await?;

            let status = job.status;
            let state = status
                .as_ref()
                .and_then(|s| s.state.clone())
                .unwrap_or_default();

            if state == "DONE" {
                if let Some(status) = status {
                    if let Some(cause) = status.error_result {
                        return Err(job_failure(&job_id, cause, status.errors));
                    }
                }
                info!(job_id = %job_id, "Load job complete");
                return Ok(LoadOutcome { job_id });
            }

            if started.elapsed() >= self.timeout {
                warn!(job_id = %job_id, "Load job timed out, requesting cancellation");
                let cancelled = self
                    .client
                    .job()
                    .cancel_job(&self.project, &job_id, location.as_deref())
                    .await
                    .is_ok();
                return Err(WarehouseError::Timeout {
                    job_id,
                    waited_secs: started.elapsed().as_secs(),
                    cancelled,
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn table_stats(&self, table: &TableId) -> Result<TableStats, WarehouseError> {
        let meta = self
            .client
            .table()
            .get(&table.project, &table.dataset, &table.table, None)
            .await?;

        Ok(TableStats {
            row_count: parse_int(meta.num_rows.as_deref()),
            logical_bytes: parse_int(meta.num_bytes.as_deref()),
            created: meta
                .creation_time
                .as_deref()
                .and_then(|ms| ms.parse::<i64>().ok())
                .and_then(ms_to_datetime),
        })
    }

    async fn counts(&self, sql: &str, columns: &[&str]) -> Result<Vec<i64>, WarehouseError> {
        let mut result = self.query(sql).await?;
        if !result.next_row() {
            return Err(WarehouseError::EmptyResult {
                sql: sql.to_string(),
            });
        }

        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            values.push(result.get_i64_by_name(column)?.unwrap_or(0));
        }
        Ok(values)
    }

    async fn sample_rows(
        &self,
        table: &TableId,
        limit: usize,
    ) -> Result<Vec<String>, WarehouseError> {
        let sql = format!(
            "SELECT TO_JSON_STRING(t) AS row_json FROM {} AS t LIMIT {}",
            table.quoted(),
            limit
        );
        let mut result = self.query(&sql).await?;

        let mut rows = Vec::new();
        while result.next_row() {
            if let Some(json) = result.get_string_by_name("row_json")? {
                rows.push(json);
            }
        }
        Ok(rows)
    }
}

/// Build the load-job body for a spec. Every load creates the table if
/// absent and truncates it on write.
fn build_load_job(spec: &LoadSpec) -> Job {
    let destination = &spec.destination;

    let mut load = JobConfigurationLoad {
        source_uris: Some(spec.source_uris.clone()),
        destination_table: Some(TableReference::new(
            &destination.project,
            &destination.dataset,
            &destination.table,
        )),
        create_disposition: Some("CREATE_IF_NEEDED".to_string()),
        write_disposition: Some("WRITE_TRUNCATE".to_string()),
        ..Default::default()
    };

    match &spec.format {
        SourceFormat::Csv {
            delimiter,
            skip_leading_rows,
            allow_quoted_newlines,
            null_marker,
            gzip: _,
        } => {
            load.source_format = Some("CSV".to_string());
            load.field_delimiter = Some(delimiter.to_string());
            load.skip_leading_rows = Some(*skip_leading_rows as i32);
            load.allow_quoted_newlines = Some(*allow_quoted_newlines);
            load.allow_jagged_rows = Some(false);
            load.encoding = Some("UTF-8".to_string());
            load.null_marker = null_marker.clone();
        }
        SourceFormat::Parquet => {
            load.source_format = Some("PARQUET".to_string());
        }
    }

    match &spec.schema {
        Some(columns) => load.schema = Some(table_schema(columns)),
        None => load.autodetect = Some(true),
    }

    Job {
        configuration: Some(JobConfiguration {
            load: Some(load),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn table_schema(columns: &[ColumnSpec]) -> TableSchema {
    let fields = columns
        .iter()
        .map(|column| match column.column_type {
            ColumnType::String => TableFieldSchema::string(&column.name),
            ColumnType::Int64 => TableFieldSchema::integer(&column.name),
            ColumnType::Float64 => TableFieldSchema::float(&column.name),
            ColumnType::Timestamp => TableFieldSchema::timestamp(&column.name),
        })
        .collect();
    TableSchema::new(fields)
}

fn job_failure(job_id: &str, cause: ErrorProto, errors: Option<Vec<ErrorProto>>) -> WarehouseError {
    let reason = cause.message.clone().unwrap_or_else(|| "unknown".to_string());
    let details = errors
        .unwrap_or_default()
        .into_iter()
        .map(|e| serde_json::to_string(&e).unwrap_or_else(|_| format!("{:?}", e)))
        .collect();
    WarehouseError::JobFailed {
        job_id: job_id.to_string(),
        reason,
        details,
    }
}

fn parse_int(value: Option<&str>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}
