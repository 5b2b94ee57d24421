// sra2bq - Reference-dataset loaders for BigQuery.
//
// Two pipelines share one step vocabulary (transfer, transform, stage,
// load, verify, cleanup):
// - sample-map: checked-in sample_id_map.csv -> staged object ->
//   explicit-schema truncate load
// - accessions: NCBI SRA_Accessions.tab -> gzip or Parquet chunks ->
//   staged object(s) -> autodetect truncate load

pub mod init;
pub mod pipeline;

pub use sra2bq_config::RunConfig;
