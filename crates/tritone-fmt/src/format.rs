//! Line formats for cached prints, metadata sidecars and exported reports.
//!
//! A posting line is `<hash> <resource_id> <t1>` in ASCII decimal, one per
//! line, LF-terminated. Cached prints for a resource live in
//! `<resource_id>.tdb`; the matching metadata sidecar is
//! `<resource_id>_meta_data.txt` with a single tab-separated line
//! `path\tduration\tnum_fingerprints`.

/// File extension for cached fingerprint files.
pub const TDB_EXTENSION: &str = "tdb";

/// Suffix of the per-resource metadata sidecar.
pub const META_DATA_SUFFIX: &str = "_meta_data.txt";

/// Header line describing the exported report's fingerprint fields.
pub const REPORT_FORMAT_HEADER: &str =
    "Fingerprint format: Hash, t1, f1, m1, t2, f2, m2, t3, f3, m3, ts";

/// A single posting as stored in a `.tdb` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrintRecord {
    pub hash: u64,
    pub resource_id: i32,
    pub t1: i32,
}

impl PrintRecord {
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.hash, self.resource_id, self.t1)
    }

    /// Parse a posting line. Returns `None` for malformed lines so callers
    /// can skip them.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let hash = parts.next()?.parse().ok()?;
        let resource_id = parts.next()?.parse().ok()?;
        let t1 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            hash,
            resource_id,
            t1,
        })
    }
}

/// Contents of a metadata sidecar.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRecord {
    pub path: String,
    pub duration: f32,
    pub num_fingerprints: i32,
}

impl MetaRecord {
    pub fn to_line(&self) -> String {
        format!("{}\t{}\t{}", self.path, self.duration, self.num_fingerprints)
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim_end().split('\t');
        let path = parts.next()?.to_string();
        let duration = parts.next()?.parse().ok()?;
        let num_fingerprints = parts.next()?.parse().ok()?;
        Some(Self {
            path,
            duration,
            num_fingerprints,
        })
    }
}

/// One line of an exported fingerprint report: the full triplet plus the
/// first-peak timestamp in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct ReportEntry {
    pub hash: u64,
    pub t1: i32,
    pub f1: i16,
    pub m1: f32,
    pub t2: i32,
    pub f2: i16,
    pub m2: f32,
    pub t3: i32,
    pub f3: i16,
    pub m3: f32,
    pub ts_ms: i32,
}

impl ReportEntry {
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {:.2} {} {} {:.2} {} {} {:.2} {}",
            self.hash,
            self.t1,
            self.f1,
            self.m1,
            self.t2,
            self.f2,
            self.m2,
            self.t3,
            self.f3,
            self.m3,
            self.ts_ms
        )
    }
}

/// Name of the cached fingerprint file for a resource.
pub fn tdb_file_name(resource_id: i32) -> String {
    format!("{}.{}", resource_id, TDB_EXTENSION)
}

/// Name of the metadata sidecar for a resource.
pub fn meta_file_name(resource_id: i32) -> String {
    format!("{}{}", resource_id, META_DATA_SUFFIX)
}
