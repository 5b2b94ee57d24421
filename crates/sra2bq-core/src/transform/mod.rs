// Transform step: re-encode a local source file before staging.
//
// Two codecs:
// - gzip: byte-for-byte re-encode, single output file
// - columnar: delimited text to size-bounded Parquet chunk files

pub mod columnar;
pub mod gzip;

pub use columnar::{delimited_to_parquet, ColumnarOptions};
pub use gzip::{compress_file, GzipReport};
