use std::io;
use std::path::PathBuf;

/// Fatal errors that abort a corpus build.
///
/// Per-record problems (blank lines, duplicates, ...) are never errors; they
/// are reported through [`RejectReason`](super::RejectReason) instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Source unreadable: {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Insufficient data for '{language}': {available} records available, at least {required} needed")]
    InsufficientData {
        language: String,
        available: usize,
        required: usize,
    },
    #[error("Output already exists: {path} (set overwrite to replace it)")]
    OutputExists { path: PathBuf },
    #[error("Destination write failed: {path}: {source}")]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Manifest error: {0}")]
    Manifest(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::SourceUnreadable { path: path.into(), source }
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::DestinationWrite { path: path.into(), source }
    }
}
