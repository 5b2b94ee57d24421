// End-to-end pipeline tests: filesystem-backed staging store, a one-shot
// HTTP fixture server for the download step, and a fake warehouse behind
// the trait seam that reads the staged objects it is asked to load.

use async_trait::async_trait;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use sra2bq_config::{Codec, RunConfig};
use sra2bq_transport::StagingStore;
use sra2bq_warehouse::{
    LoadOutcome, LoadSpec, SourceFormat, TableId, TableStats, Warehouse, WarehouseError,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct FakeWarehouse {
    /// Staging root, so loads can read the objects they are pointed at.
    root: PathBuf,
    bucket: String,
    loads: Mutex<Vec<LoadSpec>>,
    table_rows: Mutex<u64>,
    fail_load: bool,
}

impl FakeWarehouse {
    fn new(root: &Path, bucket: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            bucket: bucket.to_string(),
            loads: Mutex::new(Vec::new()),
            table_rows: Mutex::new(0),
            fail_load: false,
        }
    }

    fn failing(root: &Path, bucket: &str) -> Self {
        Self {
            fail_load: true,
            ..Self::new(root, bucket)
        }
    }

    fn loads(&self) -> Vec<LoadSpec> {
        self.loads.lock().unwrap().clone()
    }

    fn rows(&self) -> u64 {
        *self.table_rows.lock().unwrap()
    }

    /// Map a gs:// URI (possibly a wildcard) to staged files on disk.
    fn resolve(&self, uri: &str) -> Vec<PathBuf> {
        let key = uri
            .strip_prefix(&format!("gs://{}/", self.bucket))
            .expect("URI outside the staging bucket");

        if let Some(stem) = key.strip_suffix("*.parquet") {
            let pattern = self.root.join(stem);
            let dir = pattern.parent().expect("wildcard with no parent");
            let file_prefix = pattern
                .file_name()
                .and_then(|n| n.to_str())
                .expect("wildcard with no file prefix")
                .to_string();

            let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
                .expect("staging prefix missing")
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with(&file_prefix) && n.ends_with(".parquet"))
                        .unwrap_or(false)
                })
                .collect();
            matches.sort();
            matches
        } else {
            vec![self.root.join(key)]
        }
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn run_load(&self, spec: &LoadSpec) -> Result<LoadOutcome, WarehouseError> {
        self.loads.lock().unwrap().push(spec.clone());

        if self.fail_load {
            return Err(WarehouseError::JobFailed {
                job_id: "job_fail".to_string(),
                reason: "CSV parse error".to_string(),
                details: vec!["invalid: too many columns at row 7".to_string()],
            });
        }

        let mut rows = 0u64;
        for uri in &spec.source_uris {
            for path in self.resolve(uri) {
                let bytes = std::fs::read(&path).map_err(|_| WarehouseError::JobFailed {
                    job_id: "job_1".to_string(),
                    reason: format!("staged object missing: {}", uri),
                    details: Vec::new(),
                })?;

                match &spec.format {
                    SourceFormat::Csv {
                        skip_leading_rows,
                        gzip,
                        ..
                    } => {
                        let text = if *gzip { gunzip(&bytes) } else { bytes };
                        rows +=
                            count_csv_records(&text).saturating_sub(*skip_leading_rows as u64);
                    }
                    SourceFormat::Parquet => {
                        rows += count_parquet_rows(&path);
                    }
                }
            }
        }

        // Truncate-and-reload: the table ends up with exactly this run's rows
        *self.table_rows.lock().unwrap() = rows;
        Ok(LoadOutcome {
            job_id: "job_1".to_string(),
        })
    }

    async fn table_stats(&self, _table: &TableId) -> Result<TableStats, WarehouseError> {
        Ok(TableStats {
            row_count: self.rows(),
            logical_bytes: 1024,
            created: None,
        })
    }

    async fn counts(&self, _sql: &str, columns: &[&str]) -> Result<Vec<i64>, WarehouseError> {
        Ok(vec![self.rows() as i64; columns.len()])
    }

    async fn sample_rows(
        &self,
        _table: &TableId,
        _limit: usize,
    ) -> Result<Vec<String>, WarehouseError> {
        Ok(vec![r#"{"sample_id":"SAMEA2466925"}"#.to_string()])
    }
}

fn gunzip(bytes: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).expect("staged gzip invalid");
    out
}

/// Quote-aware record counting: newlines inside quoted fields do not
/// terminate a record.
fn count_csv_records(bytes: &[u8]) -> u64 {
    let mut in_quotes = false;
    let mut records = 0u64;
    for &b in bytes {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => records += 1,
            _ => {}
        }
    }
    if let Some(last) = bytes.last() {
        if *last != b'\n' {
            records += 1;
        }
    }
    records
}

fn count_parquet_rows(path: &Path) -> u64 {
    let reader = ParquetRecordBatchReaderBuilder::try_new(std::fs::File::open(path).unwrap())
        .unwrap()
        .build()
        .unwrap();
    reader.map(|batch| batch.unwrap().num_rows() as u64).sum()
}

/// One-shot HTTP server serving a fixed body on any request.
async fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; 4096];
        let _ = stream.read(&mut request).await.unwrap();

        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(header.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();
        stream.flush().await.unwrap();
    });

    format!("http://{}", addr)
}

fn test_config() -> RunConfig {
    let mut config = RunConfig::default();
    // Small chunks so progress ticks and buffered writes are exercised
    config.transfer.chunk_bytes = 64;
    config.transfer.progress_every = 4;
    config
}

const QUOTED_NEWLINE_CSV: &str = "sample_id,run_ids,sample_name,study_name\n\
SAMEA1,ERR1,\"name\nwith newline\",StudyA\n\
SAMEA2,ERR2,plain,StudyA\n\
SAMEA3,ERR3,other,StudyB\n";

#[tokio::test]
async fn sample_map_loads_three_rows_with_quoted_newline() {
    let staging_root = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();

    let csv = data_dir.path().join("sample_id_map.csv");
    std::fs::write(&csv, QUOTED_NEWLINE_CSV).unwrap();

    let mut config = test_config();
    config.sample_map.csv = csv;

    let store = StagingStore::fs(staging_root.path(), "cmgd-data", "sra_metadata").unwrap();
    let warehouse = FakeWarehouse::new(staging_root.path(), "cmgd-data");

    sra2bq::pipeline::sample_map::run(&config, &store, &warehouse)
        .await
        .unwrap();

    // The embedded newline must not split a record
    assert_eq!(warehouse.rows(), 3);

    let loads = warehouse.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(
        loads[0].source_uris,
        vec!["gs://cmgd-data/sra_metadata/sample_id_map.csv".to_string()]
    );
    match &loads[0].format {
        SourceFormat::Csv {
            delimiter,
            skip_leading_rows,
            allow_quoted_newlines,
            ..
        } => {
            assert_eq!(*delimiter, ',');
            assert_eq!(*skip_leading_rows, 1);
            assert!(*allow_quoted_newlines);
        }
        other => panic!("unexpected load format: {:?}", other),
    }
    let schema = loads[0].schema.as_ref().expect("explicit schema expected");
    assert_eq!(schema.len(), 4);
    assert_eq!(schema[0].name, "sample_id");

    // Staged object is removed after the load
    assert!(!store.exists("sample_id_map.csv").await.unwrap());
}

#[tokio::test]
async fn sample_map_missing_csv_mutates_nothing() {
    let staging_root = tempfile::tempdir().unwrap();

    let mut config = test_config();
    config.sample_map.csv = PathBuf::from("/nonexistent/sample_id_map.csv");

    let store = StagingStore::fs(staging_root.path(), "cmgd-data", "sra_metadata").unwrap();
    let warehouse = FakeWarehouse::new(staging_root.path(), "cmgd-data");

    let result = sra2bq::pipeline::sample_map::run(&config, &store, &warehouse).await;
    assert!(result.is_err());
    assert!(warehouse.loads().is_empty(), "no load job may be issued");
}

#[tokio::test]
async fn sample_map_rerun_is_idempotent() {
    let staging_root = tempfile::tempdir().unwrap();
    let data_dir = tempfile::tempdir().unwrap();

    let csv = data_dir.path().join("sample_id_map.csv");
    std::fs::write(&csv, QUOTED_NEWLINE_CSV).unwrap();

    let mut config = test_config();
    config.sample_map.csv = csv;

    let store = StagingStore::fs(staging_root.path(), "cmgd-data", "sra_metadata").unwrap();
    let warehouse = FakeWarehouse::new(staging_root.path(), "cmgd-data");

    sra2bq::pipeline::sample_map::run(&config, &store, &warehouse)
        .await
        .unwrap();
    sra2bq::pipeline::sample_map::run(&config, &store, &warehouse)
        .await
        .unwrap();

    let loads = warehouse.loads();
    assert_eq!(loads.len(), 2);
    assert_eq!(loads[0], loads[1], "unchanged source must issue an identical load");
    assert_eq!(warehouse.rows(), 3);
}

#[tokio::test]
async fn accessions_gzip_end_to_end() {
    let staging_root = tempfile::tempdir().unwrap();

    let body = b"Accession\tSubmission\tStatus\nSRR000001\tSRA000001\tlive\nSRR000002\tSRA000002\tlive\n".to_vec();
    let base = serve_once(body).await;

    let mut config = test_config();
    config.accessions.url = format!("{}/SRA_Accessions.tab", base);
    config.accessions.codec = Codec::Gzip;

    let store = StagingStore::fs(staging_root.path(), "cmgd-data", "sra_metadata").unwrap();
    let warehouse = FakeWarehouse::new(staging_root.path(), "cmgd-data");

    sra2bq::pipeline::accessions::run(&config, &store, &warehouse)
        .await
        .unwrap();

    assert_eq!(warehouse.rows(), 2);

    let loads = warehouse.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(
        loads[0].source_uris,
        vec!["gs://cmgd-data/sra_metadata/SRA_Accessions.tab.gz".to_string()]
    );
    match &loads[0].format {
        SourceFormat::Csv {
            delimiter, gzip, ..
        } => {
            assert_eq!(*delimiter, '\t');
            assert!(*gzip);
        }
        other => panic!("unexpected load format: {:?}", other),
    }
    assert!(loads[0].schema.is_none(), "accessions schema is autodetected");

    // Staged object removed, keep_staged defaults to false
    assert!(!store.exists("SRA_Accessions.tab.gz").await.unwrap());
}

#[tokio::test]
async fn accessions_parquet_wildcard_load() {
    let staging_root = tempfile::tempdir().unwrap();

    let mut body = String::from("Accession\tSubmission\tStatus\n");
    for i in 0..5 {
        body.push_str(&format!("SRR00000{}\tSRA000001\tlive\n", i));
    }
    let base = serve_once(body.into_bytes()).await;

    let mut config = test_config();
    config.accessions.url = format!("{}/SRA_Accessions.tab", base);
    config.accessions.codec = Codec::Parquet;
    config.staging.keep_staged = true;

    let store = StagingStore::fs(staging_root.path(), "cmgd-data", "sra_metadata").unwrap();
    let warehouse = FakeWarehouse::new(staging_root.path(), "cmgd-data");

    sra2bq::pipeline::accessions::run(&config, &store, &warehouse)
        .await
        .unwrap();

    assert_eq!(warehouse.rows(), 5);

    let loads = warehouse.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(
        loads[0].source_uris,
        vec!["gs://cmgd-data/sra_metadata/accessions-part-*.parquet".to_string()]
    );
    assert_eq!(loads[0].format, SourceFormat::Parquet);

    // keep_staged retains the chunk files
    assert!(store.exists("accessions-part-00000.parquet").await.unwrap());
}

#[tokio::test]
async fn accessions_load_failure_surfaces_and_keeps_staged() {
    let staging_root = tempfile::tempdir().unwrap();

    let body = b"Accession\tStatus\nSRR000001\tlive\n".to_vec();
    let base = serve_once(body).await;

    let mut config = test_config();
    config.accessions.url = format!("{}/SRA_Accessions.tab", base);
    config.accessions.codec = Codec::Gzip;

    let store = StagingStore::fs(staging_root.path(), "cmgd-data", "sra_metadata").unwrap();
    let warehouse = FakeWarehouse::failing(staging_root.path(), "cmgd-data");

    let err = sra2bq::pipeline::accessions::run(&config, &store, &warehouse)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Load failed"));

    // Remote cleanup is not reached on a failed load; the staged object
    // remains for inspection or a retried run.
    assert!(store.exists("SRA_Accessions.tab.gz").await.unwrap());
}

#[tokio::test]
async fn accessions_download_failure_mutates_nothing() {
    let staging_root = tempfile::tempdir().unwrap();

    let mut config = test_config();
    // Nothing listens on port 1
    config.accessions.url = "http://127.0.0.1:1/SRA_Accessions.tab".to_string();

    let store = StagingStore::fs(staging_root.path(), "cmgd-data", "sra_metadata").unwrap();
    let warehouse = FakeWarehouse::new(staging_root.path(), "cmgd-data");

    let result = sra2bq::pipeline::accessions::run(&config, &store, &warehouse).await;
    assert!(result.is_err());
    assert!(warehouse.loads().is_empty());
    assert!(!store.exists("SRA_Accessions.tab.gz").await.unwrap());
}
