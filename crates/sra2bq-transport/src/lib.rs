// sra2bq-transport - Moving bytes in and out of the pipeline host.
//
// - fetch: HTTPS streaming download to local disk (transfer step)
// - store: GCS staging through an OpenDAL operator (stage step)
// - composite: parallel composite upload via the gcloud CLI (stage step)

pub mod composite;
pub mod fetch;
pub mod store;

pub use composite::CompositeUploader;
pub use store::StagingStore;
