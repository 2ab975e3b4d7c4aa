//! Tritone fingerprint cache and report formats

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{
    meta_file_name, tdb_file_name, MetaRecord, PrintRecord, ReportEntry, META_DATA_SUFFIX,
    REPORT_FORMAT_HEADER, TDB_EXTENSION,
};
pub use reader::{read_meta_file, read_print_file};
pub use writer::{append_print_file, write_meta_file, write_report};
