//! Error kinds surfaced by the engine.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The decoder could not produce PCM for a resource.
    #[error("failed to decode '{path}': {reason}")]
    Decode { path: String, reason: String },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A storage backend failed; the current store/query is aborted.
    #[error(transparent)]
    Storage(#[from] tritone_store::StorageError),

    /// Plain file I/O outside the storage backends (reports, caches).
    #[error("I/O on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// No metadata is stored for the resource.
    #[error("no metadata for resource {0}")]
    NotFound(i32),

    /// A caller-provided deadline expired before the operation completed.
    #[error("operation cancelled by deadline")]
    Cancelled,
}

impl Error {
    pub fn decode(path: &Path, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
