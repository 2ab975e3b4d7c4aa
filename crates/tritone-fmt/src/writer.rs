//! Writers for cached print files, metadata sidecars and fingerprint reports.

use crate::format::{MetaRecord, PrintRecord, ReportEntry, REPORT_FORMAT_HEADER};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Append postings to a `.tdb` file, creating it if needed.
pub fn append_print_file(path: &Path, prints: &[PrintRecord]) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for print in prints {
        writeln!(writer, "{}", print.to_line())?;
    }
    writer.flush()
}

/// Write (or overwrite) a metadata sidecar.
pub fn write_meta_file(path: &Path, meta: &MetaRecord) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", meta.to_line())?;
    writer.flush()
}

/// Write the exported fingerprint report for a stored resource.
pub fn write_report(path: &Path, duration: f32, entries: &[ReportEntry]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "Duration: {}", duration)?;
    writeln!(writer, "Number of Prints: {}", entries.len())?;
    writeln!(writer, "{}", REPORT_FORMAT_HEADER)?;
    writeln!(writer, "Fingerprints:")?;
    for entry in entries {
        writeln!(writer, "{}", entry.to_line())?;
    }
    writeln!(writer)?;
    writer.flush()
}
