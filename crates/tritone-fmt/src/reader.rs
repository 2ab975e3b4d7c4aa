//! Readers for cached print files and metadata sidecars.

use crate::format::{MetaRecord, PrintRecord};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Read every posting from a `.tdb` file.
///
/// Corrupt lines are skipped with a warning; the file is left untouched.
pub fn read_print_file(path: &Path) -> io::Result<Vec<PrintRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut prints = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match PrintRecord::parse(&line) {
            Some(print) => prints.push(print),
            None => log::warn!(
                "Skipping corrupt posting line {} in {}",
                index + 1,
                path.display()
            ),
        }
    }
    Ok(prints)
}

/// Read a metadata sidecar. Returns `None` when the contents do not parse.
pub fn read_meta_file(path: &Path) -> io::Result<Option<MetaRecord>> {
    let contents = std::fs::read_to_string(path)?;
    let meta = contents.lines().next().and_then(MetaRecord::parse);
    if meta.is_none() {
        log::warn!("Unparseable metadata sidecar {}", path.display());
    }
    Ok(meta)
}
